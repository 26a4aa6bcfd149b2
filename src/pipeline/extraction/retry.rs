//! Timeout-and-retry wrapper for blocking extraction backends.

use std::time::Duration;

use super::ExtractionError;
use crate::config::IntakeConfig;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            attempt_timeout: config.backend_timeout(),
            max_retries: config.max_retries,
            base_backoff: config.retry_backoff(),
        }
    }

    /// Delay before retry number `attempt` (0-based): base, 2×base, 4×base, …
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run a blocking call on the blocking pool, retrying retryable failures.
///
/// Each attempt gets its own timeout. A timed-out attempt is abandoned; its
/// thread finishes in the background and the result is dropped.
pub async fn call_with_retry<T, F>(label: &str, policy: &RetryPolicy, call: F) -> Result<T, ExtractionError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, ExtractionError> + Clone + Send + 'static,
{
    let mut attempt = 0u32;
    loop {
        let attempt_call = call.clone();
        let outcome = tokio::time::timeout(
            policy.attempt_timeout,
            tokio::task::spawn_blocking(attempt_call),
        )
        .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ExtractionError::Backend(format!("{label} task failed: {join_err}"))),
            Err(_) => Err(ExtractionError::Timeout {
                stage: label.to_string(),
                after_ms: policy.attempt_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    stage = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Extraction call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(stage = label, attempts = attempt + 1, error = %e, "Extraction call gave up");
                return Err(e);
            }
        }
    }
}
