// src/server/handler.rs

//! Request handlers for the path API.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::DefaultDirectRateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::FetchResult;
use crate::server::AppState;

/// Body of `POST /{path}`.
#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Reply to a successful `POST /{path}`.
#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub message: String,
    pub path: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Reply to `GET /{path}`.
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub path: String,
    pub results: Vec<FetchResult>,
}

/// Error reply, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn too_many_requests() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Too Many Requests".to_string(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Middleware spending one token per request; health checks are exempt.
pub async fn rate_limit(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/health/live" || path == "/health/ready" {
        return next.run(request).await;
    }
    if limiter.check().is_err() {
        log::warn!("Rate limit exceeded: {} {}", request.method(), path);
        return ApiError::too_many_requests().into_response();
    }
    next.run(request).await
}

/// Map a request path to its store key: drop the leading slash, `/` for root.
pub fn path_key(raw: &str) -> String {
    let trimmed = raw.strip_prefix('/').unwrap_or(raw);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn key_of(path: Option<Path<String>>) -> String {
    path.map(|Path(p)| path_key(&p))
        .unwrap_or_else(|| "/".to_string())
}

/// `POST /{path}`: validate and store the submitted URLs.
pub async fn store_path(
    State(state): State<AppState>,
    path: Option<Path<String>>,
    body: Result<Json<StoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    let path = key_of(path);
    let Json(request) = body.map_err(|e| {
        log::debug!("Rejected body for '{}': {}", path, e);
        ApiError::bad_request("Invalid request body")
    })?;

    if request.urls.is_empty() {
        return Err(ApiError::bad_request("No URLs provided"));
    }

    let validator = state.fetcher.validator();
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for url in request.urls {
        match validator.validate(&url) {
            Ok(_) => valid.push(url),
            Err(e) => invalid.push(format!("{url}: {e}")),
        }
    }

    if valid.is_empty() {
        return Err(ApiError::bad_request(format!(
            "All URLs are invalid: [{}]",
            invalid.join(", ")
        )));
    }

    if let Err(e) = state.store.store(&path, &valid).await {
        log::error!("Failed to store URLs for '{}': {}", path, e);
        return Err(ApiError::internal("Failed to store URLs"));
    }

    log::info!(
        "Stored {} URLs for '{}' ({} rejected)",
        valid.len(),
        path,
        invalid.len()
    );

    let warning = (!invalid.is_empty()).then(|| {
        format!(
            "Some URLs were rejected: {} valid, {} invalid",
            valid.len(),
            invalid.len()
        )
    });

    Ok((
        StatusCode::CREATED,
        Json(StoreResponse {
            message: "URLs stored successfully".to_string(),
            path,
            count: valid.len(),
            invalid_urls: invalid,
            warning,
        }),
    ))
}

/// `GET /{path}`: fetch every URL stored for the path.
pub async fn lookup_path(
    State(state): State<AppState>,
    path: Option<Path<String>>,
) -> Result<Json<LookupResponse>, ApiError> {
    let path = key_of(path);

    let records = state.store.lookup(&path).await.map_err(|e| {
        log::error!("Failed to look up '{}': {}", path, e);
        ApiError::internal("Failed to fetch records")
    })?;

    // Cancels in-flight fetches if the client goes away or the server stops.
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();
    let results = state.fetcher.fetch_all(&records, &cancel).await;

    log::info!("Fetched {} URLs for '{}'", results.len(), path);
    Ok(Json(LookupResponse { path, results }))
}

/// `GET /health/live`
pub async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /health/ready`
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "store": state.store.backend() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_key() {
        assert_eq!(path_key("/"), "/");
        assert_eq!(path_key(""), "/");
        assert_eq!(path_key("/docs"), "docs");
        assert_eq!(path_key("docs/api"), "docs/api");
        assert_eq!(path_key("//double"), "/double");
    }

    #[test]
    fn test_store_response_omits_empty_fields() {
        let response = StoreResponse {
            message: "URLs stored successfully".into(),
            path: "p".into(),
            count: 1,
            invalid_urls: Vec::new(),
            warning: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("invalid_urls").is_none());
        assert!(value.get("warning").is_none());
        assert_eq!(value["count"], 1);
    }
}
