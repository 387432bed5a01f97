//! Retry logic with exponential backoff.

use crate::config::OrchestratorConfig;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_delay_ms`.
pub fn compute_delay(config: &OrchestratorConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31) as i32;
    let delay_ms = (config.base_delay_ms as f64) * 2f64.powi(exponent);
    let capped = delay_ms.min(config.max_delay_ms as f64) as u64;
    Duration::from_millis(capped)
}

/// Whether another retry is allowed after `retries_so_far` retries.
pub fn should_retry(config: &OrchestratorConfig, retries_so_far: u32) -> bool {
    config.auto_retry && retries_so_far < config.max_retries
}
