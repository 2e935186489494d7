//! Per-URL fetch results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the `content` field of a result is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncoding {
    /// Body kept as text
    #[serde(rename = "utf-8")]
    Utf8,
    /// Body encoded with standard base64
    #[serde(rename = "base64")]
    Base64,
}

/// Outcome of fetching one URL. Never persisted.
///
/// `error` is mutually exclusive with the response fields: a failed fetch
/// carries only `url`, `error` and `fetched_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchResult {
    /// URL as stored for the path
    pub url: String,

    /// URL of the final response when redirects were followed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,

    /// Whether at least one redirect was followed
    #[serde(default)]
    pub redirected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,

    /// Non-fatal notice, e.g. body truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    /// Create a failed result for `url`.
    pub fn failed(url: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            final_url: None,
            redirected: false,
            status_code: None,
            content_type: None,
            content: None,
            content_encoding: None,
            warning: None,
            error: Some(error.to_string()),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_truncated(&self) -> bool {
        self.warning.is_some()
    }
}
