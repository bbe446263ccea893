//! Bounded exponential backoff for store operations.

use std::future::Future;
use std::time::Duration;

use jobline_core::config::worker::WorkerConfig;
use jobline_core::result::AppResult;

/// Retry policy for store calls that fail with a retryable error.
///
/// Delay for retry `n` (zero-based) is `base_delay * 2^n`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Build the policy from worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_retries: config.store_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// Outcome of a retried store write.
#[derive(Debug)]
pub struct WriteAttempt<T> {
    /// Result of the last try.
    pub result: AppResult<T>,
    /// Tries that failed retryably before it.
    pub retries: u32,
}

impl<T> WriteAttempt<T> {
    /// Whether an earlier try failed in a way that may still have applied it.
    pub fn was_interrupted(&self) -> bool {
        self.retries > 0
    }
}

/// Run `op`, retrying retryable failures according to `policy`.
///
/// Non-retryable errors (e.g. `Conflict`) end the loop on first occurrence.
/// A try that failed with `StoreUnavailable` may have been applied before
/// the connection dropped, so callers of non-idempotent writes use the
/// count to recognize their own earlier write.
pub async fn retry_store_write<T, F, Fut>(
    policy: &BackoffPolicy,
    op_name: &str,
    mut op: F,
) -> WriteAttempt<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation = op_name,
                    retry = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            result => {
                return WriteAttempt {
                    result,
                    retries: retry,
                };
            }
        }
    }
}
