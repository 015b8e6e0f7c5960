//! Tailoring Engine — runs the full tailoring pipeline for one user and job.
//!
//! Flow: fetch corpus → validate → order experiences → score → select →
//!       rewrite (optional) → assemble + score.
//!
//! Everything except the corpus fetch and the rewrite batch is synchronous and
//! pure. The engine never persists; callers save the returned resume once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::TokenUsage;
use crate::models::experience::{Bullet, Corpus, Experience};
use crate::models::job::JobSpec;
use crate::models::resume::{Resume, ResumeStatus};
use crate::repository::{check_transition, ProfileRepository};
use crate::tailoring::assembler::{assemble, AssemblyInput, ResumeMeta};
use crate::tailoring::matcher::{match_skills, JobTerms};
use crate::tailoring::orchestrator::{RewriteBatch, RewriteOrchestrator, RewriteSettings};
use crate::tailoring::score::{compute_match_score, MatchScoreBreakdown, MatchScoreWeights};
use crate::tailoring::scorer::{score_bullet, score_corpus, ScoredBullet, ScoringWeights};
use crate::tailoring::selector::{select, SelectionBudget};

// ────────────────────────────────────────────────────────────────────────────
// Configuration and I/O types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TailoringConfig {
    pub scoring: ScoringWeights,
    pub budget: SelectionBudget,
    pub match_weights: MatchScoreWeights,
    pub rewrite: RewriteSettings,
    pub default_language: String,
}

impl Default for TailoringConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringWeights::default(),
            budget: SelectionBudget::default(),
            match_weights: MatchScoreWeights::default(),
            rewrite: RewriteSettings::default(),
            default_language: "en".to_string(),
        }
    }
}

impl TailoringConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.scoring.validate()?;
        self.budget.validate()?;
        self.match_weights.validate()?;
        normalize_language(&self.default_language)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TailorOptions {
    /// Falls back to the configured default language (or the resume's, on regenerate).
    #[serde(default)]
    pub target_language: Option<String>,
    /// Set to false to keep every selected bullet's original text.
    #[serde(default = "default_rewrite")]
    pub rewrite: bool,
}

fn default_rewrite() -> bool {
    true
}

impl Default for TailorOptions {
    fn default() -> Self {
        Self {
            target_language: None,
            rewrite: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExcludedBullet {
    pub bullet_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TailorOutcome {
    pub resume: Resume,
    pub breakdown: MatchScoreBreakdown,
    pub warnings: Vec<String>,
    pub token_usage: TokenUsage,
    pub degraded_bullet_ids: Vec<Uuid>,
    pub excluded: Vec<ExcludedBullet>,
}

/// Lowercased BCP-47-ish code: a 2–3 letter language plus optional subtags.
pub fn normalize_language(code: &str) -> Result<String, AppError> {
    let normalized = code.trim().to_lowercase().replace('_', "-");
    let mut parts = normalized.split('-');
    let primary_ok = parts
        .next()
        .map(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    let rest_ok = parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()));
    if primary_ok && rest_ok {
        Ok(normalized)
    } else {
        Err(AppError::Validation(format!(
            "Invalid target language '{code}'"
        )))
    }
}

/// Current roles first, then most recent start date; id keeps the order total.
pub fn order_experiences(experiences: &[Experience]) -> Vec<Experience> {
    let mut ordered = experiences.to_vec();
    ordered.sort_by(|a, b| {
        b.is_current
            .cmp(&a.is_current)
            .then_with(|| b.start_date.cmp(&a.start_date))
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// Ownership, non-empty corpus and experiences, impact range and content checks.
pub fn validate_corpus(user_id: Uuid, corpus: &Corpus) -> Result<(), AppError> {
    if corpus.profile.user_id != user_id {
        return Err(AppError::Validation(format!(
            "Profile does not belong to user {user_id}"
        )));
    }
    if corpus.bullet_count() == 0 {
        return Err(AppError::Validation(
            "No experience bullets found. Add experience before tailoring a resume.".to_string(),
        ));
    }
    for experience in &corpus.experiences {
        if experience.user_id != user_id {
            return Err(AppError::Validation(format!(
                "Experience {} does not belong to user {user_id}",
                experience.id
            )));
        }
        if experience.bullets.is_empty() {
            return Err(AppError::Validation(format!(
                "Experience {} has no bullets",
                experience.id
            )));
        }
        for bullet in &experience.bullets {
            if bullet.experience_id != experience.id {
                return Err(AppError::Validation(format!(
                    "Bullet {} is not owned by experience {}",
                    bullet.id, experience.id
                )));
            }
            if !bullet.impact_score.is_finite() || !(0.0..=100.0).contains(&bullet.impact_score) {
                return Err(AppError::Validation(format!(
                    "Bullet {} has impact score {} outside 0-100",
                    bullet.id, bullet.impact_score
                )));
            }
            if bullet.content.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Bullet {} has no content",
                    bullet.id
                )));
            }
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

pub struct TailoringEngine {
    profiles: Arc<dyn ProfileRepository>,
    orchestrator: Option<RewriteOrchestrator>,
    config: TailoringConfig,
}

impl TailoringEngine {
    /// `orchestrator` is `None` when no provider is configured; resumes then keep
    /// original bullet text.
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        orchestrator: Option<RewriteOrchestrator>,
        config: TailoringConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            profiles,
            orchestrator,
            config,
        })
    }

    /// Name of the configured rewrite provider, if any.
    pub fn rewrite_provider(&self) -> Option<&str> {
        self.orchestrator.as_ref().map(|o| o.provider_name())
    }

    /// Fetches the user's corpus and tailors a new resume to `job`.
    pub async fn tailor(
        &self,
        user_id: Uuid,
        job: &JobSpec,
        options: &TailorOptions,
        cancel: &CancellationToken,
    ) -> Result<TailorOutcome, AppError> {
        info!("Fetching corpus for user {user_id}");
        let corpus = self.profiles.fetch_corpus(user_id).await?;
        self.tailor_corpus(user_id, &corpus, job, options, cancel).await
    }

    /// Same pipeline as [`tailor`](Self::tailor) on an already-fetched corpus.
    pub async fn tailor_corpus(
        &self,
        user_id: Uuid,
        corpus: &Corpus,
        job: &JobSpec,
        options: &TailorOptions,
        cancel: &CancellationToken,
    ) -> Result<TailorOutcome, AppError> {
        let language = match &options.target_language {
            Some(code) => normalize_language(code)?,
            None => normalize_language(&self.config.default_language)?,
        };
        let meta = ResumeMeta::new(user_id, language);
        self.run(corpus, job, options, meta, cancel).await
    }

    /// Re-runs tailoring for an existing resume, keeping its id, job and creation time.
    /// The result goes back to `draft`; submitted (and later) resumes are frozen.
    pub async fn regenerate(
        &self,
        existing: &Resume,
        options: &TailorOptions,
        cancel: &CancellationToken,
    ) -> Result<TailorOutcome, AppError> {
        check_transition(existing.status, ResumeStatus::Draft)?;

        let language = match &options.target_language {
            Some(code) => normalize_language(code)?,
            None => existing.target_language.clone(),
        };
        let corpus = self.profiles.fetch_corpus(existing.user_id).await?;
        let meta = ResumeMeta {
            id: existing.id,
            user_id: existing.user_id,
            target_language: language,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        let mut outcome = self.run(&corpus, &existing.job, options, meta, cancel).await?;
        outcome.resume.status = ResumeStatus::Draft;
        Ok(outcome)
    }

    /// Recomputes the match score of a persisted resume from the user's current corpus.
    pub async fn rescore(&self, resume: &Resume) -> Result<MatchScoreBreakdown, AppError> {
        let corpus = self.profiles.fetch_corpus(resume.user_id).await?;
        self.rescore_with_corpus(resume, &corpus)
    }

    /// Pure re-score: persisted selection and rendered text, no provider calls.
    pub fn rescore_with_corpus(
        &self,
        resume: &Resume,
        corpus: &Corpus,
    ) -> Result<MatchScoreBreakdown, AppError> {
        if corpus.profile.user_id != resume.user_id {
            return Err(AppError::Validation(format!(
                "Profile does not belong to user {}",
                resume.user_id
            )));
        }

        let terms = JobTerms::from_job(&resume.job, self.config.scoring.max_job_keywords);
        let selected = resume
            .selected_bullet_ids
            .iter()
            .map(|id| match corpus.find_bullet(*id) {
                Some((experience, bullet)) if experience.user_id == resume.user_id => {
                    Ok(score_bullet(bullet, &terms, &self.config.scoring))
                }
                _ => Err(AppError::Validation(format!(
                    "Bullet {id} does not belong to user {}",
                    resume.user_id
                ))),
            })
            .collect::<Result<Vec<ScoredBullet>, AppError>>()?;

        let skills = match_skills(&corpus.skills, &terms);
        Ok(compute_match_score(
            &selected,
            &resume.content.rendered_texts(),
            &skills,
            &terms,
            &self.config.match_weights,
        ))
    }

    /// Runs the pipeline.
    ///
    /// Steps:
    /// 1. validate_corpus() → ownership, non-empty, impact range
    /// 2. order_experiences() → presentation order
    /// 3. score_corpus() → HashMap<bullet_id, ScoredBullet>
    /// 4. select() → Selection (budget + cap + floor)
    /// 5. rewrite_all() → RewriteBatch, bounded by the deadline and `cancel`
    /// 6. assemble() → Resume + MatchScoreBreakdown
    async fn run(
        &self,
        corpus: &Corpus,
        job: &JobSpec,
        options: &TailorOptions,
        meta: ResumeMeta,
        cancel: &CancellationToken,
    ) -> Result<TailorOutcome, AppError> {
        let started = Instant::now();
        let user_id = meta.user_id;
        let mut warnings = Vec::new();

        // Step 1: Validate
        validate_corpus(user_id, corpus)?;
        if job.is_blank() {
            warn!("Empty job description for user {user_id}; ranking by impact only");
            warnings.push("Job description is empty; bullets were ranked by impact only".to_string());
        }

        // Step 2: Order
        let experiences = order_experiences(&corpus.experiences);

        // Step 3: Score
        let terms = JobTerms::from_job(job, self.config.scoring.max_job_keywords);
        let scores = score_corpus(&experiences, &terms, &self.config.scoring);

        // Step 4: Select
        let selection = select(&experiences, &scores, &self.config.budget)?;
        info!(
            "Selected {} of {} bullets ({} chars) for user {}",
            selection.picks.len(),
            corpus.bullet_count(),
            selection.total_chars,
            user_id
        );

        // Step 5: Rewrite
        let batch = match (&self.orchestrator, options.rewrite) {
            (Some(orchestrator), true) => {
                self.rewrite(orchestrator, &experiences, &selection.bullet_ids(), job, &terms, &meta, cancel)
                    .await
            }
            (None, true) => {
                warnings.push(
                    "No rewrite provider configured; bullets keep their original text".to_string(),
                );
                RewriteBatch::default()
            }
            (_, false) => RewriteBatch::default(),
        };

        // Step 6: Assemble
        let skills = match_skills(&corpus.skills, &terms);
        let input = AssemblyInput {
            profile: &corpus.profile,
            experiences: &experiences,
            selection: &selection,
            scores: &scores,
            rewrites: &batch.outcomes,
            skills: &skills,
            job,
            terms: &terms,
        };
        let (resume, breakdown) = assemble(&input, meta, &self.config.match_weights);

        info!(
            "Tailored resume {} for user {}: score={}/100, degraded={}, tokens={}, took {}ms",
            resume.id,
            user_id,
            resume.match_score,
            batch.degraded_ids().len(),
            batch.usage.total(),
            started.elapsed().as_millis()
        );

        let degraded_bullet_ids = batch.degraded_ids();
        warnings.extend(batch.warnings);

        Ok(TailorOutcome {
            resume,
            breakdown,
            warnings,
            token_usage: batch.usage,
            degraded_bullet_ids,
            excluded: selection
                .excluded
                .into_iter()
                .map(|(bullet_id, reason)| ExcludedBullet { bullet_id, reason })
                .collect(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn rewrite(
        &self,
        orchestrator: &RewriteOrchestrator,
        experiences: &[Experience],
        bullet_ids: &[Uuid],
        job: &JobSpec,
        terms: &JobTerms,
        meta: &ResumeMeta,
        cancel: &CancellationToken,
    ) -> RewriteBatch {
        let by_id: HashMap<Uuid, &Bullet> = experiences
            .iter()
            .flat_map(|e| e.bullets.iter())
            .map(|b| (b.id, b))
            .collect();
        let bullets: Vec<&Bullet> = bullet_ids.iter().filter_map(|id| by_id.get(id).copied()).collect();

        // The child token fires on caller cancellation or on the deadline.
        let run_token = cancel.child_token();
        let deadline = self.config.rewrite.deadline;
        let timer = tokio::spawn({
            let token = run_token.clone();
            async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            }
        });

        let mut batch = orchestrator
            .rewrite_all(&bullets, job, terms, &meta.target_language, &run_token)
            .await;
        timer.abort();

        if run_token.is_cancelled() && !cancel.is_cancelled() {
            warn!(
                "Rewrite deadline of {}s exceeded for resume {}",
                deadline.as_secs(),
                meta.id
            );
            batch
                .warnings
                .push(format!("Rewrite deadline of {}s exceeded", deadline.as_secs()));
        }
        batch
    }
}
