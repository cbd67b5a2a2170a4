//! Management HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{FloodgateConfig, RateLimitConfig};
use crate::error::Result;
use crate::ratelimit::AdmissionEngine;

use super::store::ConfigStore;

/// State shared across management handlers.
pub struct ManagementState {
    /// The admission engine receiving rule updates
    engine: Arc<AdmissionEngine>,
    /// Persistence for the configuration
    store: Arc<dyn ConfigStore>,
    /// The current configuration; `rate_limits` is the section the
    /// management API reads and replaces
    config: RwLock<FloodgateConfig>,
}

impl ManagementState {
    /// Create the shared handler state.
    pub fn new(
        engine: Arc<AdmissionEngine>,
        store: Arc<dyn ConfigStore>,
        config: FloodgateConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config: RwLock::new(config),
        }
    }
}

/// HTTP server for the management API.
pub struct ManagementServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared handler state
    state: Arc<ManagementState>,
}

impl ManagementServer {
    /// Create a new management server.
    pub fn new(
        addr: SocketAddr,
        engine: Arc<AdmissionEngine>,
        store: Arc<dyn ConfigStore>,
        config: FloodgateConfig,
    ) -> Self {
        Self {
            addr,
            state: Arc::new(ManagementState::new(engine, store, config)),
        }
    }

    /// Build the management router.
    pub fn router(state: Arc<ManagementState>) -> Router {
        Router::new()
            .route(
                "/v1/ratelimits",
                get(get_rate_limits).put(put_rate_limits),
            )
            .with_state(state)
    }

    /// Start the management server.
    ///
    /// The provided future triggers a graceful shutdown when it completes.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting management server");

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Management server stopped");
        Ok(())
    }
}

/// Return the current rate limit rule configuration.
async fn get_rate_limits(State(state): State<Arc<ManagementState>>) -> Json<RateLimitConfig> {
    Json(state.config.read().rate_limits.clone())
}

/// Replace the rate limit rule configuration.
///
/// An undecodable payload is rejected and leaves the engine untouched.
/// Semantically invalid rules are not a transport failure; the engine logs
/// and skips them.
async fn put_rate_limits(
    State(state): State<Arc<ManagementState>>,
    body: std::result::Result<Json<RateLimitConfig>, JsonRejection>,
) -> Response {
    let Json(rate_limits) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejecting undecodable rate limit payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid body" })),
            )
                .into_response();
        }
    };

    // Swap the configuration section, then push the new rules into the
    // engine. The lock is released before any I/O.
    let snapshot = {
        let mut config = state.config.write();
        config.rate_limits = rate_limits;
        config.clone()
    };

    state
        .engine
        .update(&snapshot.rate_limits.rules, &snapshot.identities);

    if let Err(err) = state.store.save(&snapshot).await {
        error!(error = %err, "Failed to persist rate limit configuration");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to persist configuration" })),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({ "active_rules": state.engine.rule_count() })),
    )
        .into_response()
}
