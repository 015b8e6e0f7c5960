use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::retry::RetryConfig;
use crate::tailoring::engine::TailoringConfig;
use crate::tailoring::orchestrator::RewriteSettings;
use crate::tailoring::score::MatchScoreWeights;
use crate::tailoring::scorer::ScoringWeights;
use crate::tailoring::selector::SelectionBudget;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or a knob does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Absent: rewrites are cached in process memory only.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub provider_timeout: Duration,
    /// `None` keeps cached rewrites forever.
    pub cache_ttl: Option<Duration>,
    pub tailoring: TailoringConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup: &lookup };
        let defaults = TailoringConfig::default();
        let rewrite_defaults = RewriteSettings::default();
        let retry_defaults = RetryConfig::default();

        let jitter: f64 = env.parse_or("TAILOR_RETRY_JITTER", retry_defaults.jitter_fraction)?;
        if !(0.0..=1.0).contains(&jitter) {
            anyhow::bail!("TAILOR_RETRY_JITTER must be between 0 and 1, got {jitter}");
        }

        let tailoring = TailoringConfig {
            scoring: ScoringWeights {
                keyword_overlap: env.parse_or("TAILOR_KEYWORD_WEIGHT", defaults.scoring.keyword_overlap)?,
                impact: env.parse_or("TAILOR_IMPACT_WEIGHT", defaults.scoring.impact)?,
                max_job_keywords: env.parse_or("TAILOR_MAX_JOB_KEYWORDS", defaults.scoring.max_job_keywords)?,
            },
            budget: SelectionBudget {
                max_bullets_per_experience: env.parse_or(
                    "TAILOR_MAX_BULLETS_PER_EXPERIENCE",
                    defaults.budget.max_bullets_per_experience,
                )?,
                max_chars_per_experience: env.parse_or(
                    "TAILOR_MAX_CHARS_PER_EXPERIENCE",
                    defaults.budget.max_chars_per_experience,
                )?,
                max_total_chars: env.parse_or("TAILOR_MAX_TOTAL_CHARS", defaults.budget.max_total_chars)?,
            },
            match_weights: MatchScoreWeights {
                mean_relevance: env.parse_or(
                    "TAILOR_MATCH_RELEVANCE_WEIGHT",
                    defaults.match_weights.mean_relevance,
                )?,
                skill_coverage: env.parse_or(
                    "TAILOR_MATCH_SKILL_WEIGHT",
                    defaults.match_weights.skill_coverage,
                )?,
                keyword_coverage: env.parse_or(
                    "TAILOR_MATCH_KEYWORD_WEIGHT",
                    defaults.match_weights.keyword_coverage,
                )?,
            },
            rewrite: RewriteSettings {
                max_in_flight: env.parse_or("TAILOR_MAX_IN_FLIGHT", rewrite_defaults.max_in_flight)?,
                retry: RetryConfig {
                    max_attempts: env.parse_or("TAILOR_RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
                    base_delay: Duration::from_millis(env.parse_or(
                        "TAILOR_RETRY_BASE_DELAY_MS",
                        retry_defaults.base_delay.as_millis() as u64,
                    )?),
                    max_delay: Duration::from_millis(env.parse_or(
                        "TAILOR_RETRY_MAX_DELAY_MS",
                        retry_defaults.max_delay.as_millis() as u64,
                    )?),
                    jitter_fraction: jitter,
                },
                breaker_threshold: env.parse_or(
                    "TAILOR_BREAKER_THRESHOLD",
                    rewrite_defaults.breaker_threshold,
                )?,
                deadline: Duration::from_secs(
                    env.parse_or("TAILOR_DEADLINE_SECS", rewrite_defaults.deadline.as_secs())?,
                ),
            },
            default_language: env
                .get("TAILOR_DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
        };

        let cache_ttl_secs: u64 = env.parse_or("TAILOR_CACHE_TTL_SECS", 7 * 24 * 60 * 60)?;

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            db_max_connections: env.parse_or("DB_MAX_CONNECTIONS", 10)?,
            redis_url: env.get("REDIS_URL"),
            anthropic_api_key: env.require("ANTHROPIC_API_KEY")?,
            port: env.parse_or("PORT", 8080)?,
            rust_log: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            provider_timeout: Duration::from_secs(env.parse_or("TAILOR_PROVIDER_TIMEOUT_SECS", 30)?),
            cache_ttl: (cache_ttl_secs > 0).then(|| Duration::from_secs(cache_ttl_secs)),
            tailoring,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Unset and blank values read as absent.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value '{raw}'")),
            None => Ok(default),
        }
    }
}
