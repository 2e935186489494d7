// src/server/mod.rs

//! HTTP front end.
//!
//! | Route                 | Handler                  |
//! |-----------------------|--------------------------|
//! | `GET /health/live`    | liveness                 |
//! | `GET /health/ready`   | readiness + store name   |
//! | `POST /{path}`        | validate and store URLs  |
//! | `GET /{path}`         | fetch stored URLs        |
//!
//! When a rate limit is configured, every route except the health checks
//! shares one token bucket; requests over it get `429`.

pub mod handler;

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::ServerConfig;
use crate::services::Fetcher;
use crate::storage::PathStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PathStore>,
    pub fetcher: Arc<Fetcher>,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
    /// Shared request budget; `None` when limiting is disabled
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl AppState {
    pub fn new(store: Arc<dyn PathStore>, fetcher: Fetcher) -> Self {
        Self {
            store,
            fetcher: Arc::new(fetcher),
            shutdown: CancellationToken::new(),
            limiter: None,
        }
    }

    /// Apply the `rps_limit` / `rps_burst` settings. A zero limit disables limiting.
    pub fn with_rate_limit(mut self, config: &ServerConfig) -> Self {
        self.limiter = match (
            NonZeroU32::new(config.rps_limit),
            NonZeroU32::new(config.rps_burst),
        ) {
            (Some(rate), Some(burst)) => {
                log::info!(
                    "Rate limiting to {} requests/s (burst {})",
                    rate,
                    burst
                );
                let quota = Quota::per_second(rate).allow_burst(burst);
                Some(Arc::new(RateLimiter::direct(quota)))
            }
            _ => None,
        };
        self
    }
}

/// Build the axum router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let limiter = state.limiter.clone();
    let router = Router::new()
        .route("/health/live", get(handler::live))
        .route("/health/ready", get(handler::ready))
        .route(
            "/",
            get(handler::lookup_path).post(handler::store_path),
        )
        .route(
            "/*path",
            get(handler::lookup_path).post(handler::store_path),
        )
        .with_state(state);

    match limiter {
        Some(limiter) => router.layer(middleware::from_fn_with_state(
            limiter,
            handler::rate_limit,
        )),
        None => router,
    }
}

/// Serve requests until Ctrl-C or until `state.shutdown` is cancelled.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(&config.bind).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received, shutting down"),
        _ = token.cancelled() => {}
    }
    token.cancel();
}
