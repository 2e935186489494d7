// src/utils/http.rs

//! HTTP client utilities.

use std::error::Error as StdError;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::redirect::Policy;
use thiserror::Error;

use crate::error::Result;
use crate::models::{ContentEncoding, FetchConfig};
use crate::utils::url::UrlValidator;

/// Raised by the redirect policy once a chain reaches the hop limit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("too many redirects (limit {0})")]
pub struct TooManyRedirects(pub usize);

/// Create a configured asynchronous HTTP client.
///
/// Redirect targets go through `validator` before they are followed, and a
/// chain is aborted with [`TooManyRedirects`] once it has made
/// `max_redirects` requests.
pub fn create_async_client(config: &FetchConfig, validator: UrlValidator) -> Result<reqwest::Client> {
    let max_redirects = config.max_redirects;
    let policy = Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_redirects {
            return attempt.error(TooManyRedirects(max_redirects));
        }
        match validator.validate_parsed(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    });

    // Targets are validated by host, so connect to them directly.
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .redirect(policy)
        .no_proxy()
        .build()?;
    Ok(client)
}

/// Response body cut off at a byte limit.
#[derive(Debug, Default)]
pub struct LimitedBody {
    pub bytes: Vec<u8>,
    /// The server sent more than the limit
    pub truncated: bool,
}

/// Read at most `limit` bytes of a response body.
///
/// A body of exactly `limit` bytes is not reported as truncated.
pub async fn read_limited(response: &mut reqwest::Response, limit: usize) -> reqwest::Result<LimitedBody> {
    let mut body = LimitedBody::default();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.bytes.len();
        if chunk.len() > room {
            body.bytes.extend_from_slice(&chunk[..room]);
            body.truncated = true;
            break;
        }
        body.bytes.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Pick the encoding for a body from its `Content-Type`.
///
/// Text, JSON and XML stay text; anything else (or no type) is base64.
pub fn classify_content(content_type: Option<&str>) -> ContentEncoding {
    let Some(content_type) = content_type else {
        return ContentEncoding::Base64;
    };
    let content_type = content_type.to_ascii_lowercase();
    if content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
    {
        ContentEncoding::Utf8
    } else {
        ContentEncoding::Base64
    }
}

/// Render `bytes` for a result's `content` field.
pub fn encode_body(bytes: &[u8], encoding: ContentEncoding) -> String {
    match encoding {
        ContentEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        ContentEncoding::Base64 => STANDARD.encode(bytes),
    }
}

/// Format an error with its whole source chain, `outer: inner: root`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
