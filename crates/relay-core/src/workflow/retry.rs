//! Retry Helper: bounded exponential backoff.
//!
//! Wait before retry *k* (1-indexed) is `delay * backoff^(k-1)`. On
//! exhaustion the last error is propagated unchanged; a predicate decides
//! which errors are retriable at all.

use std::time::Duration;

/// Backoff parameters for `retry`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts including the first, so `max_attempts >= 1`.
    pub max_attempts: u32,
    /// Wait before the first retry, in seconds.
    pub delay_secs: f64,
    /// Multiplier applied to the wait on each subsequent retry.
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 1.0,
            backoff: 2.0,
        }
    }
}

impl RetryConfig {
    /// Wait duration before attempt `attempt` (1-indexed; `attempt == 1`
    /// means "before the first retry", i.e. `k = 1` in `delay * backoff^(k-1)`).
    pub fn wait_before(&self, attempt: u32) -> Duration {
        let k = attempt.saturating_sub(1) as i32;
        let secs = self.delay_secs * self.backoff.powi(k);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Retries `op` up to `config.max_attempts` times, sleeping
/// `config.wait_before(k)` between attempts. `is_retriable` decides whether
/// a given error is worth retrying at all; a non-retriable error propagates
/// immediately regardless of remaining attempts.
pub async fn retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut is_retriable: impl FnMut(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !is_retriable(&err) {
                    return Err(err);
                }
                let wait = config.wait_before(attempt);
                tracing::warn!(attempt, max = config.max_attempts, ?wait, "retrying after failure");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
