//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound fetch limits
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Path store backend and resilience settings
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(AppError::config("server.bind is empty"));
        }
        if self.server.rps_limit > 0 && self.server.rps_burst == 0 {
            return Err(AppError::config(
                "server.rps_burst must be > 0 when rate limiting is enabled",
            ));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::config("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::config("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::config("fetch.max_concurrent must be > 0"));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(AppError::config("fetch.max_body_bytes must be > 0"));
        }
        if let StoreBackend::Sqlite {
            url,
            max_connections,
        } = &self.store.backend
        {
            if url.trim().is_empty() {
                return Err(AppError::config("store.backend.url is empty"));
            }
            if *max_connections == 0 {
                return Err(AppError::config(
                    "store.backend.max_connections must be > 0",
                ));
            }
        }
        if self.store.retry.max_attempts == 0 {
            return Err(AppError::config("store.retry.max_attempts must be > 0"));
        }
        if self.store.breaker.failure_threshold == 0 {
            return Err(AppError::config(
                "store.breaker.failure_threshold must be > 0",
            ));
        }
        if self.store.breaker.half_open_max_probes == 0 {
            return Err(AppError::config(
                "store.breaker.half_open_max_probes must be > 0",
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8080`
    #[serde(default = "defaults::bind")]
    pub bind: String,

    /// Sustained requests per second across all API routes; 0 disables limiting
    #[serde(default = "defaults::rps_limit")]
    pub rps_limit: u32,

    /// Requests allowed in a burst above the sustained rate
    #[serde(default = "defaults::rps_burst")]
    pub rps_burst: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            rps_limit: defaults::rps_limit(),
            rps_burst: defaults::rps_burst(),
        }
    }
}

/// Outbound HTTP fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent requests per batch
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Response bodies are cut off after this many bytes
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum redirect hops before the request is aborted
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,

    /// Hosts exempt from the private-address checks
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            max_body_bytes: defaults::max_body_bytes(),
            max_redirects: defaults::max_redirects(),
            allowed_hosts: Vec::new(),
        }
    }
}

/// Path store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which provider backs the store
    #[serde(default)]
    pub backend: StoreBackend,

    /// Retry schedule for the durable provider
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker for the durable provider
    #[serde(default)]
    pub breaker: BreakerConfig,
}

/// Store provider selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-lifetime map, lost on restart
    #[default]
    Memory,
    /// SQLite database through sqlx
    Sqlite {
        url: String,
        #[serde(default = "defaults::max_connections")]
        max_connections: u32,
    },
}

/// Retry schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per operation, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay in milliseconds
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Breaker opens once consecutive failures exceed this count
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before probing
    #[serde(default = "defaults::cooldown")]
    pub cooldown_secs: u64,

    /// Calls admitted while half-open
    #[serde(default = "defaults::half_open_max_probes")]
    pub half_open_max_probes: u32,
}

impl BreakerConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            half_open_max_probes: self.half_open_max_probes,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            cooldown_secs: defaults::cooldown(),
            half_open_max_probes: defaults::half_open_max_probes(),
        }
    }
}

mod defaults {
    // Server defaults
    pub fn bind() -> String {
        "0.0.0.0:8080".into()
    }
    pub fn rps_limit() -> u32 {
        100
    }
    pub fn rps_burst() -> u32 {
        200
    }

    // Fetch defaults
    pub fn user_agent() -> String {
        concat!("pathfetch/", env!("CARGO_PKG_VERSION")).into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        10
    }
    pub fn max_body_bytes() -> usize {
        1 << 20
    }
    pub fn max_redirects() -> usize {
        10
    }

    // Store defaults
    pub fn max_connections() -> u32 {
        5
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay_ms() -> u64 {
        100
    }
    pub fn max_delay_ms() -> u64 {
        2_000
    }
    pub fn failure_threshold() -> u32 {
        3
    }
    pub fn cooldown() -> u64 {
        10
    }
    pub fn half_open_max_probes() -> u32 {
        5
    }
}
