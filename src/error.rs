// src/error.rs

//! Unified error handling for the aggregation service.

use std::fmt;

use thiserror::Error;

use crate::utils::url::ValidationError;

/// Result type alias for store and service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// URL rejected by the validator
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store operation failed after all retries
    #[error("Storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// Circuit breaker rejected the call without contacting the backend
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a storage error with the failed operation as context.
    pub fn storage(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error was caused by caller input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the resilience layer may retry the failed attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Io(_) | Self::Storage { .. })
    }
}
