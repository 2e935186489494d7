//! Service layer for the aggregation service.
//!
//! - URL fetching (`Fetcher`)

mod fetcher;

pub use fetcher::{FetchError, Fetcher};
