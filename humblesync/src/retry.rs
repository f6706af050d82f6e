//! Bounded retry with exponential backoff and jitter.
//!
//! The download orchestrator wraps each transfer in [`RetryPolicy::run_if`]
//! instead of looping ad hoc: the attempt ceiling and backoff shape live in
//! one policy value, and the predicate decides which errors are worth
//! another attempt (transport errors yes, a 401 no).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// How often and how patiently to retry a failing operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per retry.
    pub base_delay: Duration,
    /// Ceiling on the computed delay, before jitter.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff starting at 500ms, capped at 10s, with full
    /// jitter.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Delay before retry number `retry` (zero-based), jittered over
    /// `[0, capped_exponential]` to decorrelate concurrent retries.
    fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.min(16)));
        let capped = exp.min(self.max_delay);
        capped.mul_f64(rand::thread_rng().gen::<f64>())
    }

    /// Runs `op` until it succeeds or attempts are exhausted.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(op, |_| true).await
    }

    /// Runs `op` until it succeeds, attempts are exhausted, or the
    /// predicate declares an error permanent. The closure receives the
    /// one-based attempt number.
    pub async fn run_if<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !should_retry(&error) {
                        return Err(RetryError {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(attempt, %error, delay_ms = delay.as_millis() as u64, "Retrying after error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A retried operation that ran out of attempts (or hit a permanent
/// error), carrying the last underlying error.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub source: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempt(s): {}", self.attempts, self.source)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
