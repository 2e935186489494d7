// src/lib.rs

//! pathfetch: stores URL lists under arbitrary paths and fetches them on demand.
//!
//! - [`storage`]: path → URL providers (memory, SQLite behind retry + breaker)
//! - [`services`]: bounded concurrent fetching
//! - [`server`]: axum HTTP front end
//! - [`utils::url`]: SSRF-safe URL validation

pub mod error;
pub mod models;
pub mod resilience;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;
