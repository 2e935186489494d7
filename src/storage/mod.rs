//! Storage abstractions for path → URL associations.
//!
//! Two providers implement [`PathStore`]:
//!
//! - [`MemoryStore`]: a lock-guarded map, lost on restart
//! - [`SqliteStore`]: a relational backend, always wrapped in [`Resilient`]
//!   (retry + circuit breaker) when built through [`open`]
//!
//! ## Schema (durable provider)
//!
//! ```text
//! paths(id INTEGER PRIMARY KEY, path TEXT UNIQUE)
//! urls (id INTEGER PRIMARY KEY, path_id → paths.id, url TEXT)
//! ```
//!
//! `store` replaces the whole URL set of a path; `lookup` returns it in
//! insertion order, or an empty list for an unknown path.

pub mod memory;
pub mod resilient;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StoreBackend, StoreConfig, UrlRecord};

// Re-export for convenience
pub use memory::MemoryStore;
pub use resilient::Resilient;
pub use sqlite::SqliteStore;

/// Trait for path → URL storage backends.
#[async_trait]
pub trait PathStore: Send + Sync {
    /// Replace the URL set stored for `path`, creating the path if needed.
    async fn store(&self, path: &str, urls: &[String]) -> Result<()>;

    /// Load the URL set stored for `path`, in insertion order.
    async fn lookup(&self, path: &str) -> Result<Vec<UrlRecord>>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Build the provider selected by configuration.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn PathStore>> {
    match &config.backend {
        StoreBackend::Memory => {
            log::info!("Using in-memory path store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite {
            url,
            max_connections,
        } => {
            let sqlite = SqliteStore::connect(url, *max_connections).await?;
            let store = Resilient::new(
                sqlite,
                config.retry.policy(),
                config.breaker.breaker_config(),
            );
            log::info!("Using SQLite path store at {}", url);
            Ok(Arc::new(store))
        }
    }
}
