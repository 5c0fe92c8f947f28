//! Bounded retry for provider calls

use std::future::Future;
use std::time::Duration;

use crate::model::RetrySettings;
use crate::service::llm::ProviderError;

/// Hard ceiling on attempts, whatever the configuration asks for
pub const MAX_ATTEMPTS: u32 = 3;

/// Linear backoff: attempt `n` waits `base_delay * n` before attempt `n + 1`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt cap is reached.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation,
                            attempt = attempt,
                            "Provider call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * attempt;
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            operation = operation,
                            attempts = attempt,
                            error = %e,
                            "Provider call failed after all retries"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy()
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ProviderError::Network("reset".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_caps_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::RateLimited("slow down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Auth("bad key".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_settings_clamps_attempts() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 0,
            base_delay_ms: 250,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(250));

        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 10,
            base_delay_ms: 1,
        });
        assert_eq!(policy.max_attempts, MAX_ATTEMPTS);
    }
}
