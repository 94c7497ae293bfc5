//! Retry of throttled detail fetches with exponential backoff

use crate::error::FetchError;
use backon::{BackoffBuilder, ExponentialBuilder};
use cloudsweep_common::defaults::DEFAULT_FETCH_RETRIES;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff settings for throttled fetches
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FETCH_RETRIES,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Fast retries without jitter, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error or the
/// attempts are used up.
///
/// Only [`FetchError::Throttled`] is retried. If `cancel` fires during a
/// backoff sleep the last error is returned immediately; callers check the
/// token to tell cancellation apart from exhaustion.
pub async fn retry_throttled<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    resource_name: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut builder = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0);
    if config.jitter {
        builder = builder.with_jitter();
    }
    let mut delays = builder.build();

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(resource = %resource_name, attempt, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = delays.next().unwrap_or(config.max_delay);
                warn!(
                    resource = %resource_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Fetch throttled, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> FetchError {
        FetchError::Throttled {
            name: "orders".into(),
            message: "Rate exceeded".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_throttled_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = retry_throttled(&RetryConfig::immediate(3), &cancel, "orders", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(throttled())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> =
            retry_throttled(&RetryConfig::immediate(2), &cancel, "orders", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(throttled())
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> =
            retry_throttled(&RetryConfig::immediate(5), &cancel, "orders", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::not_found("orders"))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            jitter: false,
        };

        let started = std::time::Instant::now();
        let result: Result<(), _> =
            retry_throttled(&config, &cancel, "orders", move || async move { Err(throttled()) }).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
