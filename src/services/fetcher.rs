// src/services/fetcher.rs

//! Fetch orchestrator.
//!
//! Fetches the URLs stored for a path concurrently and returns one result per
//! record, in record order. A failing URL never fails the batch; its result
//! carries the error instead.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{FetchConfig, FetchResult, UrlRecord};
use crate::utils::http::{
    TooManyRedirects, classify_content, create_async_client, encode_body, error_chain,
    read_limited,
};
use crate::utils::url::{UrlValidator, ValidationError};

/// Why a single URL could not be fetched.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("redirect blocked: {0}")]
    BlockedRedirect(ValidationError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("cancelled")]
    Cancelled,
}

/// Concurrent, bounded URL fetcher.
#[derive(Clone)]
pub struct Fetcher {
    config: Arc<FetchConfig>,
    client: Client,
    validator: Arc<UrlValidator>,
}

impl Fetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let validator = UrlValidator::with_allowed_hosts(&config.allowed_hosts);
        let client = create_async_client(&config, validator.clone())?;
        Ok(Self {
            config: Arc::new(config),
            client,
            validator: Arc::new(validator),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Validator applied to stored URLs and redirect targets.
    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    /// Fetch every record, at most `max_concurrent` at a time.
    ///
    /// The output has one entry per record, in the same order. Cancelling
    /// `cancel` aborts all in-flight fetches; dropping the returned future
    /// aborts the spawned tasks.
    pub async fn fetch_all(&self, records: &[UrlRecord], cancel: &CancellationToken) -> Vec<FetchResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let fetcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let url = record.url.clone();
            tasks.spawn(async move {
                let result = fetcher.fetch_guarded(&url, &semaphore, &cancel).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<FetchResult>> = vec![None; records.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => log::error!("Fetch task failed: {}", e),
            }
        }

        let results: Vec<FetchResult> = slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| FetchResult::failed(&record.url, "fetch task aborted"))
            })
            .collect();

        log::debug!(
            "Fetched {} URLs ({} failed)",
            results.len(),
            results.iter().filter(|r| !r.is_success()).count()
        );
        results
    }

    /// Fetch one URL under the batch semaphore, racing the cancellation token.
    async fn fetch_guarded(
        &self,
        url: &str,
        semaphore: &Semaphore,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            outcome = async {
                let _permit = semaphore.acquire().await.map_err(|_| FetchError::Cancelled)?;
                self.fetch(url).await
            } => outcome,
        };

        outcome.unwrap_or_else(|e| {
            log::warn!("Failed to fetch {}: {}", url, e);
            FetchResult::failed(url, e)
        })
    }

    async fn fetch(&self, url: &str) -> std::result::Result<FetchResult, FetchError> {
        let target = self.validator.validate(url)?;

        let mut response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = read_limited(&mut response, self.config.max_body_bytes)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.config.timeout())
                } else {
                    FetchError::Body(error_chain(&e))
                }
            })?;

        let encoding = classify_content(content_type.as_deref());
        let redirected = final_url != target;
        let warning = body.truncated.then(|| {
            format!(
                "Response truncated due to size limit ({} bytes)",
                self.config.max_body_bytes
            )
        });

        Ok(FetchResult {
            url: url.to_string(),
            final_url: redirected.then(|| final_url.to_string()),
            redirected,
            status_code: Some(status_code),
            content_type,
            content: Some(encode_body(&body.bytes, encoding)),
            content_encoding: Some(encoding),
            warning,
            error: None,
            fetched_at: Utc::now(),
        })
    }

    fn request_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout(self.config.timeout());
        }
        if error.is_redirect() {
            if let Some(source) = error.source() {
                if let Some(e) = source.downcast_ref::<ValidationError>() {
                    return FetchError::BlockedRedirect(e.clone());
                }
                if let Some(TooManyRedirects(limit)) = source.downcast_ref::<TooManyRedirects>() {
                    return FetchError::TooManyRedirects(*limit);
                }
            }
        }
        FetchError::Request(error_chain(&error))
    }
}
