//! Bounded retry for transient storage errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

use super::config::RetryConfig;

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): exponential from the
    /// base, capped at the max, plus random jitter.
    pub fn delay_for(&self, attempt: u16) -> Duration {
        let exponent = u32::from(attempt.saturating_sub(1)).min(16);
        let raw = self
            .backoff_base()
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max());

        let jitter_cap = raw.as_millis() as f64 * f64::from(self.jitter_ratio.clamp(0.0, 1.0));
        if jitter_cap < 1.0 {
            return raw;
        }
        let jitter = rand::rng().random_range(0.0..jitter_cap);
        raw + Duration::from_millis(jitter as u64)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is spent.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u16 = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
