//! Retry policy for repository calls.
//!
//! An explicit policy object composed around the repository-call boundary:
//! retries transient failures with jittered exponential backoff, logs each
//! attempt, and re-raises the last error once attempts are exhausted.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::errors::RepositoryError;

/// Retry policy: max attempts plus backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and base delay.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(5),
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt
    /// budget is exhausted. Only retryable repository errors are retried.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying repository call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            op = op_name,
                            attempt,
                            error = %err,
                            "Repository call exhausted retries"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(self.max_delay);
        // Full jitter keeps concurrent retries from synchronizing.
        let jitter = rand::rng().random_range(0.5..1.0);
        capped.mul_f64(jitter)
    }
}
