//! Stored path and URL association records.

use serde::{Deserialize, Serialize};

/// A URL attached to a stored path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlRecord {
    /// Record identifier, increasing in insertion order within a path
    pub id: i64,

    /// Identifier of the owning path
    pub path_id: i64,

    /// The URL as submitted by the caller
    pub url: String,
}

impl UrlRecord {
    pub fn new(id: i64, path_id: i64, url: impl Into<String>) -> Self {
        Self {
            id,
            path_id,
            url: url.into(),
        }
    }
}

/// Collect the URL strings of a record list, preserving order.
pub fn urls_of(records: &[UrlRecord]) -> Vec<&str> {
    records.iter().map(|r| r.url.as_str()).collect()
}
