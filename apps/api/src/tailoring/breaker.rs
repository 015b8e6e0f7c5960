use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-run circuit breaker for provider calls.
///
/// Counts consecutive final failures (after retries). Trips once the count
/// reaches `threshold` and stays open for the rest of the run; a success
/// before that resets the count.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: AtomicU32,
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn record_success(&self) {
        if !self.is_open() {
            self.consecutive_failures.store(0, Ordering::Release);
        }
    }

    /// Returns `true` only for the failure that trips the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.threshold {
            return !self.open.swap(true, Ordering::AcqRel);
        }
        false
    }
}
