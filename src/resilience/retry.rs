//! Retry loop with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before the next attempt.
    ///
    /// `attempt` is 1-based (1 = first attempt). Errors the breaker raised
    /// or that came from bad input are never retried.
    pub fn decide(&self, attempt: u32, error: &AppError) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::NoRetry;
        }
        // base * 2^(attempt-1), capped.
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

/// Runs `f` until it succeeds or the policy says to stop.
///
/// Attempts are strictly sequential. When a retryable error survives the
/// last attempt it is reported as [`AppError::Storage`] for `operation`.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.decide(attempt, &e) {
                RetryDecision::RetryAfter(delay) => {
                    log::warn!(
                        "Retrying {} (attempt {}/{}) in {:?}: {}",
                        operation,
                        attempt + 1,
                        policy.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::NoRetry if e.is_retryable() => {
                    log::error!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(AppError::storage(
                        operation,
                        format!("failed after {attempt} attempts: {e}"),
                    ));
                }
                RetryDecision::NoRetry => return Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> AppError {
        AppError::Database(sqlx::Error::PoolTimedOut)
    }

    #[test]
    fn no_retry_for_open_circuit() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.decide(1, &AppError::CircuitOpen("db".into())),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 20,
            ..RetryPolicy::default()
        };
        let delay = |attempt| match p.decide(attempt, &transient()) {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        };
        assert_eq!(delay(1), Duration::from_millis(100));
        assert_eq!(delay(2), Duration::from_millis(200));
        assert_eq!(delay(3), Duration::from_millis(400));
        assert_eq!(delay(10), p.max_delay);
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy::default();
        assert!(matches!(
            p.decide(1, &transient()),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            p.decide(2, &transient()),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(3, &transient()), RetryDecision::NoRetry);
    }

    #[tokio::test(start_paused = true)]
    async fn run_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = run_with_retry(&RetryPolicy::default(), "lookup", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_storage_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = run_with_retry(&RetryPolicy::default(), "store", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AppError::Storage { operation, message }) => {
                assert_eq!(operation, "store");
                assert!(message.contains("3 attempts"));
            }
            other => panic!("expected storage error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_does_not_retry_open_circuit() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = run_with_retry(&RetryPolicy::default(), "store", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::CircuitOpen("db".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AppError::CircuitOpen(_))));
    }
}
