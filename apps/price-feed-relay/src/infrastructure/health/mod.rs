//! Health Check and Metrics Endpoint
//!
//! HTTP listener on the configured port. Used by container orchestrators,
//! load balancers and monitoring.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status of the feed and the publish loop
//! - `GET /healthz` - liveness check (always OK)
//! - `GET /readyz` - readiness check (OK once the feed is connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{FeedState, PublishStats};
use crate::domain::schema::SchemaId;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Registered schema id.
    pub schema_id: String,
    /// Trade stream status.
    pub feed: FeedInfo,
    /// Publish loop status.
    pub publish: PublishInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed connected and the last publish succeeded.
    Healthy,
    /// Feed connected but the last publish failed.
    Degraded,
    /// Feed disconnected.
    Unhealthy,
}

/// Trade stream status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Whether the stream is connected.
    pub connected: bool,
    /// Trades applied to the cache.
    pub trades_applied: u64,
    /// Messages dropped.
    pub messages_dropped: u64,
    /// Reconnect attempts since startup.
    pub reconnect_attempts: u32,
    /// Exchange time of the newest applied trade, Unix milliseconds.
    pub last_trade_time_ms: Option<u64>,
}

/// Publish loop status.
#[derive(Debug, Clone, Serialize)]
pub struct PublishInfo {
    /// Confirmed cycles.
    pub confirmed: u64,
    /// Failed cycles.
    pub failed: u64,
    /// Id of the last confirmed record, hex.
    pub last_record_id: Option<String>,
    /// Most recent failure.
    pub last_error: Option<String>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    schema_id: SchemaId,
    feed: Arc<FeedState>,
    publish: Arc<PublishStats>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        schema_id: SchemaId,
        feed: Arc<FeedState>,
        publish: Arc<PublishStats>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            schema_id,
            feed,
            publish,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let listener = Self::bind(self.port).await?;
        self.serve(listener).await
    }

    /// Bind the listener on all interfaces.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::BindFailed` if the port is unavailable.
    pub async fn bind(port: u16) -> Result<TcpListener, HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(port, e.to_string()))
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feed.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = FeedInfo {
        connected: state.feed.is_connected(),
        trades_applied: state.feed.trades_applied(),
        messages_dropped: state.feed.messages_dropped(),
        reconnect_attempts: state.feed.reconnect_attempts(),
        last_trade_time_ms: state.feed.last_trade_time_ms(),
    };
    let publish = PublishInfo {
        confirmed: state.publish.confirmed(),
        failed: state.publish.failed(),
        last_record_id: state.publish.last_record_id().map(|id| id.to_hex()),
        last_error: state.publish.last_error(),
    };

    HealthResponse {
        status: determine_health_status(feed.connected, state.publish.last_cycle_failed()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        schema_id: state.schema_id.to_hex(),
        feed,
        publish,
    }
}

const fn determine_health_status(feed_connected: bool, last_cycle_failed: bool) -> HealthStatus {
    match (feed_connected, last_cycle_failed) {
        (false, _) => HealthStatus::Unhealthy,
        (true, true) => HealthStatus::Degraded,
        (true, false) => HealthStatus::Healthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
