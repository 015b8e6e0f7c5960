//! AI Rewrite Orchestrator — cache-first, bounded-concurrency bullet rewriting.
//!
//! Flow per run: cache lookups → one provider call per miss (behind the shared
//! semaphore, wrapped in [`RetryPolicy`]) → cache writes for successes → original
//! text for everything else. The run as a whole never fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm_client::prompts::{
    GROUNDING_INSTRUCTION, REWRITE_CONTEXT_TEMPLATE, REWRITE_PROMPT_TEMPLATE,
};
use crate::llm_client::retry::{RetryConfig, RetryPolicy};
use crate::llm_client::{Generation, LlmError, TextGenerator, TokenUsage};
use crate::models::experience::Bullet;
use crate::models::job::JobSpec;
use crate::tailoring::breaker::CircuitBreaker;
use crate::tailoring::cache::{job_digest, CacheEntry, CacheKey, RewriteCache};
use crate::tailoring::matcher::JobTerms;

/// Keywords passed to the provider per bullet.
const PROMPT_KEYWORD_LIMIT: usize = 15;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RewriteSettings {
    /// Per-process bound on concurrent provider calls.
    pub max_in_flight: usize,
    pub retry: RetryConfig,
    pub breaker_threshold: u32,
    /// Whole-batch deadline; unfinished bullets fall back.
    pub deadline: Duration,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            retry: RetryConfig::default(),
            breaker_threshold: 3,
            deadline: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSource {
    Cache,
    Provider,
    /// Original text, because the call failed, was skipped or was cancelled.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    pub text: String,
    pub source: RewriteSource,
    pub error: Option<String>,
}

impl RewriteOutcome {
    fn fallback(bullet: &Bullet, error: impl Into<String>) -> Self {
        Self {
            text: bullet.content.trim().to_string(),
            source: RewriteSource::Fallback,
            error: Some(error.into()),
        }
    }

    pub fn degraded(&self) -> bool {
        self.source == RewriteSource::Fallback
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewriteBatch {
    pub outcomes: HashMap<Uuid, RewriteOutcome>,
    pub usage: TokenUsage,
    pub warnings: Vec<String>,
    pub circuit_open: bool,
    pub cache_hits: usize,
}

impl RewriteBatch {
    pub fn degraded_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .outcomes
            .iter()
            .filter(|(_, o)| o.degraded())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

/// Why a provider call produced no text.
#[derive(Debug)]
enum CallFailure {
    Provider(LlmError),
    CircuitOpen,
    Cancelled,
}

impl CallFailure {
    fn describe(&self) -> String {
        match self {
            CallFailure::Provider(e) => e.to_string(),
            CallFailure::CircuitOpen => "circuit breaker open".to_string(),
            CallFailure::Cancelled => "cancelled before completion".to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt construction
// ────────────────────────────────────────────────────────────────────────────

pub fn build_rewrite_context(job: &JobSpec) -> String {
    REWRITE_CONTEXT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{job_description}", job.description.trim())
}

pub fn build_rewrite_prompt(bullet: &Bullet, keywords: &[String], language: &str) -> String {
    let keywords = if keywords.is_empty() {
        "(none)".to_string()
    } else {
        keywords.join(", ")
    };
    REWRITE_PROMPT_TEMPLATE
        .replace("{language}", language)
        .replace("{keywords}", &keywords)
        .replace("{bullet}", bullet.content.trim())
}

/// Required phrases first, then the rest of the vocabulary.
fn prompt_keywords(terms: &JobTerms) -> Vec<String> {
    let mut keywords: Vec<String> = terms.required.clone();
    for token in &terms.vocabulary {
        if keywords.len() >= PROMPT_KEYWORD_LIMIT {
            break;
        }
        if !keywords.iter().any(|k| k.split(' ').any(|part| part == token)) {
            keywords.push(token.clone());
        }
    }
    keywords.truncate(PROMPT_KEYWORD_LIMIT);
    keywords
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RewriteOrchestrator {
    provider: Arc<dyn TextGenerator>,
    cache: Arc<dyn RewriteCache>,
    limiter: Arc<Semaphore>,
    breaker_threshold: u32,
}

impl RewriteOrchestrator {
    /// `provider` is a single-attempt generator; retry is layered on here.
    pub fn new(
        provider: Arc<dyn TextGenerator>,
        cache: Arc<dyn RewriteCache>,
        settings: &RewriteSettings,
    ) -> Self {
        Self {
            provider: Arc::new(RetryPolicy::new(provider, settings.retry.clone())),
            cache,
            limiter: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            breaker_threshold: settings.breaker_threshold,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Rewrites `bullets` for `job` in `language`.
    ///
    /// Every input bullet gets an outcome: cached text, fresh provider text, or its
    /// original text flagged as degraded. Cancelling `cancel` abandons in-flight calls.
    pub async fn rewrite_all(
        &self,
        bullets: &[&Bullet],
        job: &JobSpec,
        terms: &JobTerms,
        language: &str,
        cancel: &CancellationToken,
    ) -> RewriteBatch {
        let mut batch = RewriteBatch::default();
        let digest = job_digest(job);

        // Step 1: Cache lookups
        let mut seen = HashSet::new();
        let mut misses: Vec<(&Bullet, CacheKey)> = Vec::new();
        for bullet in bullets.iter().copied() {
            if !seen.insert(bullet.id) {
                continue;
            }
            let key = CacheKey::derive(&bullet.content, &digest, language);
            match self.cache.get(&key).await {
                Ok(Some(entry)) => {
                    debug!(bullet_id = %bullet.id, "rewrite cache hit");
                    batch.cache_hits += 1;
                    batch.outcomes.insert(
                        bullet.id,
                        RewriteOutcome {
                            text: entry.text,
                            source: RewriteSource::Cache,
                            error: None,
                        },
                    );
                }
                Ok(None) => misses.push((bullet, key)),
                Err(e) => {
                    warn!(bullet_id = %bullet.id, error = %e, "rewrite cache read failed, treating as miss");
                    misses.push((bullet, key));
                }
            }
        }

        if misses.is_empty() {
            return batch;
        }

        info!(
            "Rewriting {} bullets via {} ({} cache hits)",
            misses.len(),
            self.provider.name(),
            batch.cache_hits
        );

        // Step 2: Provider calls for misses
        let context: Arc<str> = Arc::from(build_rewrite_context(job));
        let keywords = prompt_keywords(terms);
        let breaker = Arc::new(CircuitBreaker::new(self.breaker_threshold));
        let mut tasks = JoinSet::new();

        for (bullet, _) in &misses {
            let bullet_id = bullet.id;
            let prompt = build_rewrite_prompt(bullet, &keywords, language);
            let context = Arc::clone(&context);
            let provider = Arc::clone(&self.provider);
            let limiter = Arc::clone(&self.limiter);
            let breaker = Arc::clone(&breaker);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let call = async {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return Err(CallFailure::Cancelled),
                    };
                    if breaker.is_open() {
                        return Err(CallFailure::CircuitOpen);
                    }
                    match provider.generate(&prompt, &context).await {
                        Ok(generation) => {
                            breaker.record_success();
                            Ok(generation)
                        }
                        Err(e) => {
                            if breaker.record_failure() {
                                warn!(bullet_id = %bullet_id, error = %e, "circuit breaker tripped");
                            }
                            Err(CallFailure::Provider(e))
                        }
                    }
                };

                let result: Result<Generation, CallFailure> = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CallFailure::Cancelled),
                    r = call => r,
                };
                (bullet_id, result)
            });
        }

        // Step 3: Collect, caching successes only
        let keys: HashMap<Uuid, &CacheKey> = misses.iter().map(|(b, k)| (b.id, k)).collect();
        let originals: HashMap<Uuid, &Bullet> = misses.iter().map(|(b, _)| (b.id, *b)).collect();
        let mut cancelled = 0usize;
        let mut skipped = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (bullet_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "rewrite task failed");
                    continue;
                }
            };
            let Some(bullet) = originals.get(&bullet_id) else {
                continue;
            };

            match result {
                Ok(generation) => {
                    batch.usage += generation.usage;
                    if let Some(key) = keys.get(&bullet_id) {
                        let entry = CacheEntry::new(generation.text.clone(), generation.usage);
                        if let Err(e) = self.cache.put(key, entry).await {
                            warn!(bullet_id = %bullet_id, error = %e, "rewrite cache write failed");
                        }
                    }
                    batch.outcomes.insert(
                        bullet_id,
                        RewriteOutcome {
                            text: generation.text,
                            source: RewriteSource::Provider,
                            error: None,
                        },
                    );
                }
                Err(failure) => {
                    match &failure {
                        CallFailure::Provider(e) if !e.is_transient() => {
                            warn!(bullet_id = %bullet_id, error = %e, "permanent provider error");
                            batch
                                .warnings
                                .push(format!("Bullet {bullet_id}: permanent provider error: {e}"));
                        }
                        CallFailure::Provider(e) => {
                            warn!(bullet_id = %bullet_id, error = %e, "rewrite failed after retries");
                        }
                        CallFailure::CircuitOpen => skipped += 1,
                        CallFailure::Cancelled => cancelled += 1,
                    }
                    batch
                        .outcomes
                        .insert(bullet_id, RewriteOutcome::fallback(bullet, failure.describe()));
                }
            }
        }

        for (bullet, _) in &misses {
            batch
                .outcomes
                .entry(bullet.id)
                .or_insert_with(|| RewriteOutcome::fallback(bullet, "rewrite task failed"));
        }

        // Step 4: Run-level warnings
        batch.circuit_open = breaker.is_open();
        if batch.circuit_open {
            batch.warnings.push(format!(
                "Circuit breaker opened after {} consecutive provider failures; {} bullets skipped the provider",
                self.breaker_threshold, skipped
            ));
        }
        if cancelled > 0 {
            batch.warnings.push(format!(
                "Rewrite cancelled or timed out; {cancelled} bullets kept their original text"
            ));
        }
        let degraded = batch.outcomes.values().filter(|o| o.degraded()).count();
        if degraded > 0 {
            warn!("{} of {} bullets kept their original text", degraded, batch.outcomes.len());
            batch.warnings.push(format!(
                "{degraded} of {} bullets kept their original text",
                batch.outcomes.len()
            ));
        }

        info!(
            "Rewrite batch done: {} rewritten, {} from cache, {} degraded, {} tokens",
            batch.outcomes.len() - degraded - batch.cache_hits,
            batch.cache_hits,
            degraded,
            batch.usage.total()
        );

        batch
    }
}
