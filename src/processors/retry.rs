use crate::error::StoreError;
use crate::utils::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Re-executes store operations that fail with a transient fault.
///
/// The delay before retry `n` (1-based) is `base_delay * (2^n - 1)`, capped at
/// `max_delay`. Fatal faults are returned immediately; once retries are exhausted the
/// last transient fault is returned. When a cancellation token is attached, a backoff
/// wait ends as soon as it fires and no further attempt is made.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    cancel: Option<CancellationToken>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31)).saturating_sub(1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retry = 0;

        loop {
            match f().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!("{} succeeded after {} retries", operation, retry);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        "{} hit transient fault ({}), retry {}/{} in {:?}",
                        operation, err.message, retry, self.max_retries, delay
                    );
                    self.backoff(operation, delay).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl RetryPolicy {
    async fn backoff(&self, operation: &str, delay: Duration) -> Result<(), StoreError> {
        let Some(cancel) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} abandoned during backoff", operation);
                Err(StoreError::cancelled(format!("{} abandoned, run cancelled", operation)))
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        )
    }
}
