//! Bounded retry for storage contention.

use std::future::Future;
use std::time::Duration;

use super::SchedulingError;
use crate::config::StorageConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay after the given (1-based) failed attempt
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// Run `op` until it succeeds, fails terminally, or exhausts the attempt budget.
/// Each attempt must be a complete transaction.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, SchedulingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SchedulingError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation,
                        attempts = attempt,
                        error = %err,
                        "Storage contention persisted, giving up"
                    );
                    return Err(SchedulingError::Transient { attempts: attempt });
                }

                let delay = policy.backoff_for(attempt);
                tracing::debug!(
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
