//! Transport-level retry with linear backoff.

use super::ApiError;
use std::future::Future;
use std::time::Duration;

/// How often and how patiently a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Attempt `n` (1-based) waits `n * base_delay` before retrying
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { retries: 0, base_delay: Duration::ZERO }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

/// Timeouts, refused or failed connections and 5xx responses.
pub fn is_transient(err: &ApiError) -> bool {
    match err {
        ApiError::Status { status, .. } => *status >= 500,
        ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// Run `op`, retrying transient failures according to `policy`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Err(e) if retry < policy.retries && is_transient(&e) => {
                retry += 1;
                let delay = policy.delay_for(retry);
                tracing::debug!(retry, delay_ms = delay.as_millis() as u64, error = %e, "retrying request");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
