pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;
use crate::tailoring::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume tailoring API
        .route("/api/v1/resumes/tailor", post(handlers::handle_tailor))
        .route("/api/v1/resumes/:id", get(handlers::handle_get_resume))
        .route(
            "/api/v1/resumes/:id/regenerate",
            post(handlers::handle_regenerate),
        )
        .route("/api/v1/resumes/:id/rescore", post(handlers::handle_rescore))
        .route(
            "/api/v1/resumes/:id/status",
            patch(handlers::handle_update_status),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::models::experience::{Bullet, Corpus, Experience, ExperienceType, Profile};
    use crate::repository::memory::{InMemoryProfileRepository, InMemoryResumeRepository};
    use crate::tailoring::engine::{TailoringConfig, TailoringEngine};

    fn corpus(user_id: Uuid) -> Corpus {
        let experience_id = Uuid::new_v4();
        Corpus {
            profile: Profile {
                user_id,
                full_name: "Alan Turing".to_string(),
                ..Profile::default()
            },
            experiences: vec![Experience {
                id: experience_id,
                user_id,
                kind: ExperienceType::Work,
                title: "Engineer".to_string(),
                organization: "Bletchley".to_string(),
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end_date: None,
                is_current: true,
                bullets: vec![Bullet {
                    id: Uuid::new_v4(),
                    experience_id,
                    content: "Broke ciphers with Rust tooling".to_string(),
                    impact_score: 90.0,
                    keywords: vec!["cryptography".to_string()],
                    display_order: 0,
                }],
            }],
            skills: vec![],
        }
    }

    fn app(user_id: Uuid) -> Router {
        let profiles = Arc::new(InMemoryProfileRepository::new().with_corpus(corpus(user_id)));
        let engine = TailoringEngine::new(profiles, None, TailoringConfig::default()).unwrap();
        build_router(AppState {
            engine: Arc::new(engine),
            resumes: Arc::new(InMemoryResumeRepository::new()),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(Uuid::new_v4()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rewrite_provider"], Value::Null);
    }

    #[tokio::test]
    async fn test_tailor_then_get_rescore_and_status() {
        let user_id = Uuid::new_v4();
        let app = app(user_id);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/resumes/tailor",
            Some(json!({ "user_id": user_id, "jd_text": "Rust cryptography engineer" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["resume"]["status"], "generated");
        let id = body["resume"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", &format!("/api/v1/resumes/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let (status, body) = send(&app, "POST", &format!("/api/v1/resumes/{id}/rescore"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_score"], body["previous_score"]);

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/resumes/{id}/status"),
            Some(json!({ "status": "submitted" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/api/v1/resumes/{id}/status"),
            Some(json!({ "status": "reviewed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "reviewed");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/resumes/{id}/regenerate"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resume"]["id"], id.as_str());
        assert_eq!(body["resume"]["status"], "draft");

        let (_, body) = send(&app, "GET", &format!("/api/v1/resumes/{id}"), None).await;
        assert_eq!(body["status"], "draft");
    }

    #[tokio::test]
    async fn test_unknown_resume_is_404() {
        let (status, body) = send(
            &app(Uuid::new_v4()),
            "GET",
            &format!("/api/v1/resumes/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_user_is_404() {
        let (status, _) = send(
            &app(Uuid::new_v4()),
            "POST",
            "/api/v1/resumes/tailor",
            Some(json!({ "user_id": Uuid::new_v4(), "jd_text": "Rust engineer" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
