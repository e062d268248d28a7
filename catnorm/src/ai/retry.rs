//! Retry with exponential backoff for AI calls
//!
//! Attempt, and on a retryable error wait then try again. The first retry
//! waits `initial_delay`, each following wait is multiplied by `multiplier`
//! and capped at `max_delay`. Non-retryable errors (4xx, parse failures)
//! return immediately. Both the attempt and the wait race the caller's
//! cancellation token.

use crate::ai::AiError;
use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(PipelineError::Config(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(PipelineError::Config(
                "retry initial delay exceeds max delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Run `operation` under `policy`
///
/// Returns the first success, the first non-retryable error, or the last
/// retryable error once retries are exhausted. Cancellation during an
/// attempt or a wait returns [`AiError::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> std::result::Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AiError>>,
{
    let start_time = Instant::now();
    let mut retry = 0u32;

    loop {
        if retry > 0 {
            let delay = policy.delay_for(retry);
            tracing::debug!(
                operation = operation_name,
                retry,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying AI request"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AiError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            outcome = operation() => outcome,
        };

        match outcome {
            Ok(value) => {
                if retry > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        retry,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "AI request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if retry >= policy.max_retries => {
                tracing::error!(
                    operation = operation_name,
                    attempts = retry + 1,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    error = %err,
                    "AI request failed: retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt = retry + 1,
                    error = %err,
                    "AI request failed, will retry after backoff"
                );
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(20),
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = retry_with_backoff(&fast_policy(), "test", &CancellationToken::new(), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AiError::Api { status: 502, body: "bad gateway".into() })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: std::result::Result<(), AiError> =
            retry_with_backoff(&fast_policy(), "test", &CancellationToken::new(), || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AiError::Api { status: 404, body: String::new() })
                }
            })
            .await;

        assert!(matches!(result, Err(AiError::Api { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: std::result::Result<(), AiError> =
            retry_with_backoff(&fast_policy(), "test", &CancellationToken::new(), || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AiError::Network("connection reset".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AiError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: std::result::Result<(), AiError> = retry_with_backoff(&policy, "test", &cancel, || async {
            Err(AiError::Api { status: 500, body: String::new() })
        })
        .await;

        assert!(matches!(result, Err(AiError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = retry_with_backoff(&fast_policy(), "test", &cancel, || async { Ok(()) }).await;
        assert!(matches!(result, Err(AiError::Cancelled)));
    }
}
