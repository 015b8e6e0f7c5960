//! Axum route handlers for the Resume Tailoring API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::JobSpec;
use crate::models::resume::{Resume, ResumeStatus};
use crate::repository::check_transition;
use crate::state::AppState;
use crate::tailoring::engine::{TailorOptions, TailorOutcome};
use crate::tailoring::score::MatchScoreBreakdown;

/// Upper bound on accepted job description text.
const MAX_JD_CHARS: usize = 50_000;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TailorRequest {
    pub user_id: Uuid,
    pub jd_text: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(flatten)]
    pub options: TailorOptions,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ResumeStatus,
}

#[derive(Debug, Serialize)]
pub struct RescoreResponse {
    pub resume_id: Uuid,
    pub previous_score: u8,
    pub match_score: u8,
    pub breakdown: MatchScoreBreakdown,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// A token cancelled when the handler future is dropped (client went away).
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// POST /api/v1/resumes/tailor
///
/// Runs the tailoring pipeline for the user and persists the generated resume.
/// Provider trouble never fails the request: affected bullets keep their original
/// text and show up in `degraded_bullet_ids` and `warnings`.
pub async fn handle_tailor(
    State(state): State<AppState>,
    Json(request): Json<TailorRequest>,
) -> Result<(StatusCode, Json<TailorOutcome>), AppError> {
    if request.jd_text.chars().count() > MAX_JD_CHARS {
        return Err(AppError::Validation(format!(
            "jd_text exceeds {MAX_JD_CHARS} characters"
        )));
    }

    let job = JobSpec {
        description: request.jd_text,
        title: request.job_title,
        company: request.company,
        required_skills: request.required_skills,
    };

    let (cancel, _guard) = request_token();
    let outcome = state
        .engine
        .tailor(request.user_id, &job, &request.options, &cancel)
        .await?;

    state.resumes.save(&outcome.resume).await?;
    info!(
        "Saved tailored resume {} for user {}",
        outcome.resume.id, request.user_id
    );

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<Resume>, AppError> {
    Ok(Json(state.resumes.get(resume_id).await?))
}

/// POST /api/v1/resumes/:id/regenerate
///
/// Re-tailors an unsubmitted resume against its stored job, keeping its id.
pub async fn handle_regenerate(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Json(options): Json<TailorOptions>,
) -> Result<Json<TailorOutcome>, AppError> {
    let existing = state.resumes.get(resume_id).await?;

    let (cancel, _guard) = request_token();
    let outcome = state.engine.regenerate(&existing, &options, &cancel).await?;
    check_transition(existing.status, outcome.resume.status)?;

    state.resumes.save(&outcome.resume).await?;
    info!("Regenerated resume {resume_id}");

    Ok(Json(outcome))
}

/// POST /api/v1/resumes/:id/rescore
///
/// Recomputes the match score from the stored selection. No provider calls.
pub async fn handle_rescore(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<RescoreResponse>, AppError> {
    let resume = state.resumes.get(resume_id).await?;
    let breakdown = state.engine.rescore(&resume).await?;

    if breakdown.score != resume.match_score {
        state.resumes.update_score(resume_id, breakdown.score).await?;
        info!(
            "Resume {} re-scored: {} -> {}",
            resume_id, resume.match_score, breakdown.score
        );
    }

    Ok(Json(RescoreResponse {
        resume_id,
        previous_score: resume.match_score,
        match_score: breakdown.score,
        breakdown,
    }))
}

/// PATCH /api/v1/resumes/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Resume>, AppError> {
    let resume = state.resumes.update_status(resume_id, request.status).await?;
    info!("Resume {} moved to '{}'", resume_id, resume.status.as_str());
    Ok(Json(resume))
}
