//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, link status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (both channels connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{BridgeStatus, StatusSnapshot};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Bridge version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Channel status.
    pub channels: ChannelsStatus,
    /// Request and frame counters.
    pub traffic: TrafficStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both channels connected.
    Healthy,
    /// One channel connected.
    Degraded,
    /// No channel connected.
    Unhealthy,
}

/// Channel connection status.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelsStatus {
    /// Request (REQ) channel connected.
    pub request: bool,
    /// Push (PULL) channel connected.
    pub push: bool,
    /// When the link last became up.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Logical disconnects since start.
    pub disconnects: u64,
}

/// Traffic counters.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficStatus {
    /// Requests awaiting a reply.
    pub pending_requests: usize,
    /// Frames sent.
    pub frames_sent: u64,
    /// Frames received.
    pub frames_received: u64,
    /// Malformed frames received.
    pub frame_anomalies: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: Arc<BridgeStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, status: Arc<BridgeStatus>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
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
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes of the health server.
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
    if state.status.is_connected() {
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
    let snapshot = state.status.snapshot();

    HealthResponse {
        status: determine_health_status(&snapshot),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        channels: ChannelsStatus {
            request: snapshot.request_up,
            push: snapshot.push_up,
            last_connected_at: snapshot.last_connected_at,
            disconnects: snapshot.disconnects,
        },
        traffic: TrafficStatus {
            pending_requests: snapshot.pending_requests,
            frames_sent: snapshot.frames_sent,
            frames_received: snapshot.frames_received,
            frame_anomalies: snapshot.frame_anomalies,
        },
    }
}

const fn determine_health_status(snapshot: &StatusSnapshot) -> HealthStatus {
    match (snapshot.request_up, snapshot.push_up) {
        (true, true) => HealthStatus::Healthy,
        (true, false) | (false, true) => HealthStatus::Degraded,
        (false, false) => HealthStatus::Unhealthy,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link::ChannelKind;

    fn state_with(request_up: bool, push_up: bool) -> HealthServerState {
        let status = Arc::new(BridgeStatus::new());
        status.set_channel_up(ChannelKind::Request, request_up);
        status.set_channel_up(ChannelKind::Push, push_up);
        HealthServerState::new("0.1.0".to_string(), status)
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_channels() {
        assert_eq!(
            build_health_response(&state_with(true, true)).status,
            HealthStatus::Healthy
        );
        assert_eq!(
            build_health_response(&state_with(false, true)).status,
            HealthStatus::Degraded
        );
        assert_eq!(
            build_health_response(&state_with(false, false)).status,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn readiness_requires_both_channels() {
        let ready = readiness_handler(State(Arc::new(state_with(true, true))))
            .await
            .into_response();
        assert_eq!(ready.status(), StatusCode::OK);

        let not_ready = readiness_handler(State(Arc::new(state_with(true, false))))
            .await
            .into_response();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await.into_response().status(), StatusCode::OK);
    }
}
