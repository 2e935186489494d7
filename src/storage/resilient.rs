//! Retry + circuit breaker wrapper for a durable provider.
//!
//! Every attempt passes through the breaker, so a backend that keeps failing
//! trips it from inside the retry loop. Rejections raised by an open breaker
//! are not retried.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::UrlRecord;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, run_with_retry};
use crate::storage::PathStore;

/// A [`PathStore`] guarded by retries and a circuit breaker.
pub struct Resilient<S> {
    inner: S,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl<S: PathStore> Resilient<S> {
    pub fn new(inner: S, policy: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        let breaker = CircuitBreaker::with_config(inner.backend(), breaker);
        Self {
            inner,
            breaker,
            policy,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: PathStore> PathStore for Resilient<S> {
    async fn store(&self, path: &str, urls: &[String]) -> Result<()> {
        run_with_retry(&self.policy, "store", move || {
            self.breaker.call(move || self.inner.store(path, urls))
        })
        .await
    }

    async fn lookup(&self, path: &str) -> Result<Vec<UrlRecord>> {
        run_with_retry(&self.policy, "lookup", move || {
            self.breaker.call(move || self.inner.lookup(path))
        })
        .await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::AppError;
    use crate::resilience::CircuitState;
    use crate::storage::MemoryStore;

    /// Memory store that can be told to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        calls: AtomicU32,
        fail_next: AtomicU32,
        down: AtomicBool,
        hang: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if scripted || self.down.load(Ordering::SeqCst) {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PathStore for FlakyStore {
        async fn store(&self, path: &str, urls: &[String]) -> Result<()> {
            self.check()?;
            self.inner.store(path, urls).await
        }

        async fn lookup(&self, path: &str) -> Result<Vec<UrlRecord>> {
            self.check()?;
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.lookup(path).await
        }

        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    fn wrap(store: FlakyStore) -> Resilient<FlakyStore> {
        Resilient::new(store, RetryPolicy::default(), CircuitBreakerConfig::default())
    }

    fn calls(store: &Resilient<FlakyStore>) -> u32 {
        store.inner().calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let store = wrap(FlakyStore::default());
        store.inner().fail_next.store(2, Ordering::SeqCst);

        store
            .store("p", &["https://a.example".to_string()])
            .await
            .unwrap();

        assert_eq!(calls(&store), 3);
        assert_eq!(store.breaker().state(), CircuitState::Closed);
        assert_eq!(store.lookup("p").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_storage_error() {
        let store = wrap(FlakyStore::default());
        store.inner().down.store(true, Ordering::SeqCst);

        let err = store.lookup("p").await.unwrap_err();
        assert!(matches!(err, AppError::Storage { ref operation, .. } if operation == "lookup"));
        assert_eq!(calls(&store), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_four_failures() {
        let store = wrap(FlakyStore::default());
        store.inner().down.store(true, Ordering::SeqCst);

        // Three attempts fail; the breaker is still closed.
        assert!(store.store("p", &[]).await.is_err());
        assert_eq!(calls(&store), 3);
        assert_eq!(store.breaker().state(), CircuitState::Closed);

        // The fourth failure trips it and the retry is rejected.
        let err = store.store("p", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen(ref name) if name == "flaky"));
        assert_eq!(calls(&store), 4);

        // Further calls fail fast without reaching the backend.
        let err = store.lookup("p").await.unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen(_)));
        assert_eq!(calls(&store), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_cooldown() {
        let store = wrap(FlakyStore::default());
        store.inner().down.store(true, Ordering::SeqCst);
        let _ = store.store("p", &[]).await;
        let _ = store.store("p", &[]).await;
        assert_eq!(store.breaker().state(), CircuitState::Open);

        store.inner().down.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.breaker().state(), CircuitState::HalfOpen);

        for _ in 0..5 {
            store.lookup("p").await.unwrap();
        }
        assert_eq!(store.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_calls_do_not_wedge_breaker() {
        let store = wrap(FlakyStore::default());
        store.inner().down.store(true, Ordering::SeqCst);
        let _ = store.lookup("p").await;
        let _ = store.lookup("p").await;
        assert_eq!(store.breaker().state(), CircuitState::Open);

        store.inner().down.store(false, Ordering::SeqCst);
        store.inner().hang.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;

        for _ in 0..5 {
            let abandoned = tokio::time::timeout(Duration::from_millis(50), store.lookup("p")).await;
            assert!(abandoned.is_err());
        }
        assert_eq!(store.breaker().state(), CircuitState::HalfOpen);

        store.inner().hang.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            store.lookup("p").await.unwrap();
        }
        assert_eq!(store.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_name_passes_through() {
        let store = wrap(FlakyStore::default());
        assert_eq!(store.backend(), "flaky");
        assert_eq!(store.breaker().name(), "flaky");
    }
}
