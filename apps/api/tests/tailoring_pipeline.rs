//! End-to-end tailoring runs against in-memory collaborators.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tailor_api::llm_client::retry::RetryConfig;
use tailor_api::llm_client::{Generation, LlmError, TextGenerator, TokenUsage};
use tailor_api::models::experience::{Bullet, Corpus, Experience, ExperienceType, Profile, Skill};
use tailor_api::models::job::JobSpec;
use tailor_api::models::resume::ResumeStatus;
use tailor_api::repository::memory::{InMemoryProfileRepository, InMemoryResumeRepository};
use tailor_api::repository::ResumeRepository;
use tailor_api::tailoring::cache::InMemoryRewriteCache;
use tailor_api::tailoring::engine::{TailorOptions, TailoringConfig, TailoringEngine};
use tailor_api::tailoring::orchestrator::RewriteOrchestrator;
use tailor_api::tailoring::scorer::ScoredBullet;
use tailor_api::tailoring::selector::{select, SelectionBudget};

/// Rewrites every bullet except those containing `fail_marker`, which get `failure()`.
struct MockProvider {
    calls: AtomicU32,
    fail_marker: Option<&'static str>,
    failure: fn() -> LlmError,
}

impl MockProvider {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_marker: None,
            failure: || LlmError::Timeout,
        })
    }

    fn failing_on(marker: &'static str, failure: fn() -> LlmError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_marker: Some(marker),
            failure,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, _context: &str) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bullet = prompt.lines().last().unwrap_or_default();
        if let Some(marker) = self.fail_marker {
            if bullet.contains(marker) {
                return Err((self.failure)());
            }
        }
        Ok(Generation {
            text: format!("{bullet} (tailored)"),
            usage: TokenUsage {
                input_tokens: 200,
                output_tokens: 30,
            },
        })
    }
}

fn experience(user_id: Uuid, title: &str, start: (i32, u32), current: bool, bullets: &[(&str, f64, &[&str])]) -> Experience {
    let id = Uuid::new_v4();
    Experience {
        id,
        user_id,
        kind: ExperienceType::Work,
        title: title.to_string(),
        organization: "Initech".to_string(),
        start_date: NaiveDate::from_ymd_opt(start.0, start.1, 1).unwrap(),
        end_date: None,
        is_current: current,
        bullets: bullets
            .iter()
            .enumerate()
            .map(|(i, (content, impact, keywords))| Bullet {
                id: Uuid::new_v4(),
                experience_id: id,
                content: content.to_string(),
                impact_score: *impact,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                display_order: i as i32,
            })
            .collect(),
    }
}

fn corpus(user_id: Uuid) -> Corpus {
    Corpus {
        profile: Profile {
            user_id,
            full_name: "Katherine Johnson".to_string(),
            email: Some("kj@example.com".to_string()),
            ..Profile::default()
        },
        experiences: vec![
            experience(
                user_id,
                "Senior Backend Engineer",
                (2021, 2),
                true,
                &[
                    ("Rebuilt the payments ledger in Rust, cutting p99 latency by 40%", 85.0, &["rust", "payments"]),
                    ("Introduced Kafka-based event sourcing for billing", 75.0, &["kafka"]),
                    ("Mentored four engineers through promotion", 50.0, &[]),
                ],
            ),
            experience(
                user_id,
                "Software Engineer",
                (2017, 9),
                false,
                &[
                    ("Maintained PostgreSQL replicas for a 2TB dataset", 60.0, &["postgresql"]),
                    ("Organized the quarterly hackathon", 20.0, &[]),
                ],
            ),
        ],
        skills: vec![
            Skill {
                name: "Rust".to_string(),
                category: "Languages".to_string(),
                proficiency: 90,
                highlighted: true,
            },
            Skill {
                name: "Kafka".to_string(),
                category: "Streaming".to_string(),
                proficiency: 70,
                highlighted: false,
            },
            Skill {
                name: "Figma".to_string(),
                category: "Design".to_string(),
                proficiency: 40,
                highlighted: false,
            },
        ],
    }
}

fn job() -> JobSpec {
    JobSpec {
        description: "We are hiring a backend engineer to build payment systems in Rust. \
                      You will run Kafka event pipelines and PostgreSQL databases."
            .to_string(),
        title: Some("Backend Engineer".to_string()),
        company: Some("Globex".to_string()),
        required_skills: vec!["Rust".to_string(), "Kafka".to_string(), "PostgreSQL".to_string()],
    }
}

fn config() -> TailoringConfig {
    let mut config = TailoringConfig::default();
    config.rewrite.retry = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        jitter_fraction: 0.0,
    };
    config
}

fn engine(user_id: Uuid, provider: Arc<MockProvider>, cache: Arc<InMemoryRewriteCache>) -> TailoringEngine {
    let config = config();
    let orchestrator = RewriteOrchestrator::new(provider, cache, &config.rewrite);
    let profiles = Arc::new(InMemoryProfileRepository::new().with_corpus(corpus(user_id)));
    TailoringEngine::new(profiles, Some(orchestrator), config).unwrap()
}

#[tokio::test]
async fn tailored_resume_is_persistable_and_rescorable() {
    let user_id = Uuid::new_v4();
    let provider = MockProvider::healthy();
    let engine = engine(user_id, provider.clone(), Arc::new(InMemoryRewriteCache::new()));
    let resumes = InMemoryResumeRepository::new();

    let outcome = engine
        .tailor(user_id, &job(), &TailorOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    resumes.save(&outcome.resume).await.unwrap();

    let stored = resumes.get(outcome.resume.id).await.unwrap();
    assert_eq!(stored.status, ResumeStatus::Generated);
    assert_eq!(stored.user_id, user_id);
    assert_eq!(stored.content.sections[0].title, "Senior Backend Engineer");
    assert_eq!(stored.content.skills[0].name, "Rust");
    assert!(stored.content.skills.iter().all(|s| s.name != "Figma"));
    assert!(outcome.warnings.is_empty(), "warnings: {:?}", outcome.warnings);
    assert_eq!(provider.calls() as usize, stored.selected_bullet_ids.len());

    let breakdown = engine.rescore(&stored).await.unwrap();
    assert_eq!(breakdown.score, stored.match_score);
    assert!(breakdown.missing_keywords.is_empty());
}

#[tokio::test]
async fn warm_cache_makes_runs_idempotent() {
    let user_id = Uuid::new_v4();
    let provider = MockProvider::healthy();
    let cache = Arc::new(InMemoryRewriteCache::new());
    let engine = engine(user_id, provider.clone(), cache.clone());
    let cancel = CancellationToken::new();

    let first = engine
        .tailor(user_id, &job(), &TailorOptions::default(), &cancel)
        .await
        .unwrap();
    let calls_after_first = provider.calls();
    let second = engine
        .tailor(user_id, &job(), &TailorOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(provider.calls(), calls_after_first);
    assert_eq!(second.token_usage, TokenUsage::default());
    assert_eq!(first.resume.selected_bullet_ids, second.resume.selected_bullet_ids);
    assert_eq!(first.resume.content, second.resume.content);
    assert_eq!(first.resume.match_score, second.resume.match_score);
    assert_eq!(cache.len(), first.resume.selected_bullet_ids.len());
}

#[tokio::test]
async fn permanent_auth_error_degrades_one_bullet_only() {
    let user_id = Uuid::new_v4();
    let provider = MockProvider::failing_on("ledger", || LlmError::Auth("invalid x-api-key".into()));
    let engine = engine(user_id, provider.clone(), Arc::new(InMemoryRewriteCache::new()));

    let outcome = engine
        .tailor(user_id, &job(), &TailorOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let bullets: Vec<_> = outcome
        .resume
        .content
        .sections
        .iter()
        .flat_map(|s| s.bullets.iter())
        .collect();
    let ledger = bullets.iter().find(|b| b.text.contains("ledger")).unwrap();
    assert_eq!(ledger.text, "Rebuilt the payments ledger in Rust, cutting p99 latency by 40%");
    assert!(ledger.degraded);
    assert_eq!(outcome.degraded_bullet_ids, vec![ledger.bullet_id]);
    assert!(bullets
        .iter()
        .filter(|b| b.bullet_id != ledger.bullet_id)
        .all(|b| b.rewritten && b.text.ends_with("(tailored)")));
    assert!(outcome.warnings.iter().any(|w| w.contains("permanent")));
    // No retries for a permanent error.
    assert_eq!(provider.calls() as usize, bullets.len());
}

#[tokio::test]
async fn always_transient_falls_back_after_max_attempts() {
    let user_id = Uuid::new_v4();
    let provider = MockProvider::failing_on("hackathon", || LlmError::Server {
        status: 503,
        message: "overloaded".into(),
    });
    let engine = engine(user_id, provider.clone(), Arc::new(InMemoryRewriteCache::new()));

    let outcome = engine
        .tailor(user_id, &job(), &TailorOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let bullets: Vec<_> = outcome
        .resume
        .content
        .sections
        .iter()
        .flat_map(|s| s.bullets.iter())
        .collect();
    let hackathon = bullets
        .iter()
        .find(|b| b.text.contains("hackathon"))
        .expect("hackathon bullet selected");
    assert!(hackathon.degraded);
    assert_eq!(hackathon.text, "Organized the quarterly hackathon");
    // Every other bullet once, the failing one max_attempts times.
    assert_eq!(provider.calls() as usize, bullets.len() - 1 + 3);
}

#[test]
fn cap_of_two_keeps_the_two_most_relevant_bullets() {
    let user_id = Uuid::new_v4();
    let exp = experience(
        user_id,
        "Engineer",
        (2020, 1),
        true,
        &[
            ("Shipped feature alpha quickly", 50.0, &[]),
            ("Shipped feature gamma quickly", 50.0, &[]),
            ("Shipped feature delta quickly", 50.0, &[]),
        ],
    );
    let relevance = [0.9, 0.6, 0.2];
    let scores: HashMap<Uuid, ScoredBullet> = exp
        .bullets
        .iter()
        .zip(relevance)
        .map(|(b, r)| {
            (
                b.id,
                ScoredBullet {
                    bullet_id: b.id,
                    experience_id: exp.id,
                    relevance: r,
                    matched_keywords: BTreeSet::new(),
                },
            )
        })
        .collect();
    let budget = SelectionBudget {
        max_bullets_per_experience: 2,
        ..SelectionBudget::default()
    };

    let selection = select(std::slice::from_ref(&exp), &scores, &budget).unwrap();
    assert_eq!(selection.bullet_ids(), vec![exp.bullets[0].id, exp.bullets[1].id]);
}
