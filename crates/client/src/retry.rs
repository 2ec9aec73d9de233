//! Retry with exponential backoff for transient node failures.

use crate::error::{UploadError, UploadResult};
use bundler_core::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule: `min_delay * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            retries: config.retries,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are exhausted (in which case the last error is returned).
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, what: &str, mut op: F) -> UploadResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = UploadResult<T>>,
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                attempt += 1;
                if attempt > policy.retries {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "{what} failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Map a failed response status to an error; `402` is always insufficient funds.
pub(crate) fn http_error(
    status: u16,
    upload_id: Option<&str>,
    offset: Option<u64>,
    body: String,
) -> UploadError {
    if status == 402 {
        return UploadError::InsufficientFunds {
            upload_id: upload_id.map(str::to_string),
            offset,
        };
    }
    UploadError::Http {
        status,
        upload_id: upload_id.map(str::to_string),
        offset,
        body,
    }
}
