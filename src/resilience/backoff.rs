//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based), capped at `max_ms`.
///
/// Up to 10% jitter is added on top of the capped delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

/// Same as [`calculate_backoff`] with bounds taken from a retry policy.
pub fn backoff_for(policy: &RetryConfig, attempt: u32) -> Duration {
    calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms)
}
