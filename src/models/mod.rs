// src/models/mod.rs

//! Domain models for the aggregation service.
//!
//! This module contains all data structures shared by the store, the fetch
//! orchestrator and the HTTP layer.

mod config;
mod fetch;
mod record;

// Re-export all public types
pub use config::{
    BreakerConfig, Config, FetchConfig, RetryConfig, ServerConfig, StoreBackend, StoreConfig,
};
pub use fetch::{ContentEncoding, FetchResult};
pub use record::{UrlRecord, urls_of};
