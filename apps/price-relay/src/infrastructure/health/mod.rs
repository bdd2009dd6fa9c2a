//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, feed status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (ready while streaming)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::feed::{FeedPhase, FeedStatus};
use crate::domain::registry::SymbolRegistry;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub feed: FeedInfo,
    /// Connected downstream subscribers.
    pub subscribers: usize,
    /// Registered instruments.
    pub instruments: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed streaming.
    Healthy,
    /// Feed reconnecting; last known prices still served.
    Degraded,
    /// Feed stopped or disabled.
    Unhealthy,
}

impl From<FeedPhase> for HealthStatus {
    fn from(phase: FeedPhase) -> Self {
        match phase {
            FeedPhase::Streaming => Self::Healthy,
            FeedPhase::Connecting | FeedPhase::Subscribing | FeedPhase::Backoff => Self::Degraded,
            FeedPhase::Disconnected | FeedPhase::Disabled => Self::Unhealthy,
        }
    }
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Current phase.
    pub phase: FeedPhase,
    /// Ticks applied since start.
    pub ticks_received: u64,
    /// Reconnect attempts since the last successful session.
    pub reconnect_attempts: u32,
    /// Last time the feed reached streaming.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent error.
    pub last_error: Option<String>,
}

impl From<&FeedStatus> for FeedInfo {
    fn from(status: &FeedStatus) -> Self {
        Self {
            phase: status.phase(),
            ticks_received: status.ticks_received(),
            reconnect_attempts: status.reconnect_attempts(),
            last_connected_at: status.last_connected_at(),
            last_error: status.last_error(),
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed_status: Arc<FeedStatus>,
    broadcast_hub: SharedBroadcastHub,
    registry: Arc<SymbolRegistry>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed_status: Arc<FeedStatus>,
        broadcast_hub: SharedBroadcastHub,
        registry: Arc<SymbolRegistry>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed_status,
            broadcast_hub,
            registry,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

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
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
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
    if state.feed_status.phase().is_streaming() {
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
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = FeedInfo::from(state.feed_status.as_ref());

    HealthResponse {
        status: HealthStatus::from(feed.phase),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        subscribers: state.broadcast_hub.subscriber_count(),
        instruments: state.registry.len(),
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
