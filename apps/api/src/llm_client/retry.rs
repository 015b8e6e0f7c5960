//! Exponential backoff retry for provider calls.
//!
//! [`RetryPolicy`] wraps any [`TextGenerator`] and retries transient failures
//! (timeouts, rate limits, 5xx) with exponential backoff plus jitter. Permanent
//! failures are returned on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::llm_client::{Generation, LlmError, TextGenerator};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500ms).
    pub base_delay: Duration,
    /// Upper bound for a single backoff (default: 8s).
    pub max_delay: Duration,
    /// Random 0..jitter_fraction of the delay is added (default: 0.25).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_fraction: 0.25,
        }
    }
}

/// Delay after failed attempt `n` (0-indexed): `min(base * 2^n, max)` plus jitter.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = config.base_delay.as_millis() as u64;
    let capped_ms = base_ms
        .saturating_mul(exp)
        .min(config.max_delay.as_millis() as u64);

    let jitter_max_ms = (capped_ms as f64 * config.jitter_fraction) as u64;
    let jitter_ms = if jitter_max_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_max_ms)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

pub struct RetryPolicy<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: TextGenerator> RetryPolicy<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<P: TextGenerator> TextGenerator for RetryPolicy<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<Generation, LlmError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.inner.generate(prompt, context).await {
                Ok(generation) => {
                    if attempt > 0 {
                        debug!(provider = %self.inner.name(), attempt, "call succeeded after retry");
                    }
                    return Ok(generation);
                }
                Err(err) => {
                    if !err.is_transient() || attempt + 1 >= attempts {
                        return Err(err);
                    }

                    let computed = compute_delay(&self.config, attempt);
                    let delay = match &err {
                        LlmError::RateLimited { retry_after_ms } => {
                            computed.max(Duration::from_millis(*retry_after_ms))
                        }
                        _ => computed,
                    };

                    warn!(
                        provider = %self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
