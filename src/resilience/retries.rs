//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible async operation with exponential backoff + jitter
//! - Give up after `max_attempts` and hand back the last error
//! - Log every failed attempt with the operation name (never its payload)

use std::fmt::Display;
use std::future::Future;

use crate::config::RetryConfig;
use crate::resilience::backoff::backoff_for;

/// Run `op` until it succeeds or `policy.max_attempts` is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = backoff_for(policy, attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay = ?delay,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(operation, attempt, error = %e, "Operation failed, giving up");
                return Err(e);
            }
        }
    }
}
