//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, pipeline status and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with pipeline counters
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (at least one producer running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::ServerError;
use super::metrics::get_metrics_handle;
use super::registry::InMemoryConnectionRegistry;
use crate::application::services::{PipelineSnapshot, PipelineStats};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Producer status.
    pub producers: ProducerStatus,
    /// Registered subscriber connections.
    pub active_connections: usize,
    /// Pipeline counters.
    pub pipeline: PipelineSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every configured producer is running.
    Healthy,
    /// Some producers are running.
    Degraded,
    /// No producer is running.
    Unhealthy,
}

/// Producer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducerStatus {
    /// Producers configured at startup.
    pub configured: usize,
    /// Producers currently running.
    pub running: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    stats: Arc<PipelineStats>,
    registry: Arc<InMemoryConnectionRegistry>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        stats: Arc<PipelineStats>,
        registry: Arc<InMemoryConnectionRegistry>,
    ) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            stats,
            registry,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
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
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

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
    if state.stats.snapshot().producers_running > 0 {
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
    let pipeline = state.stats.snapshot();
    let producers = ProducerStatus {
        configured: pipeline.producers_configured,
        running: pipeline.producers_running,
    };

    HealthResponse {
        status: determine_health_status(producers),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        producers,
        active_connections: state.registry.len(),
        pipeline,
    }
}

const fn determine_health_status(producers: ProducerStatus) -> HealthStatus {
    if producers.running == 0 {
        HealthStatus::Unhealthy
    } else if producers.running >= producers.configured {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn state() -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "0.1.0",
            Arc::new(PipelineStats::new()),
            Arc::new(InMemoryConnectionRegistry::new(4, Duration::from_secs(60))),
        ))
    }

    const fn producers(configured: usize, running: usize) -> ProducerStatus {
        ProducerStatus {
            configured,
            running,
        }
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
    fn determine_status_by_running_producers() {
        assert_eq!(determine_health_status(producers(3, 3)), HealthStatus::Healthy);
        assert_eq!(determine_health_status(producers(3, 1)), HealthStatus::Degraded);
        assert_eq!(determine_health_status(producers(3, 0)), HealthStatus::Unhealthy);
        assert_eq!(determine_health_status(producers(0, 0)), HealthStatus::Unhealthy);
    }

    #[test]
    fn response_reflects_pipeline() {
        let state = state();
        state.stats.set_producers_configured(2);
        state.stats.producer_started();
        let _conn = state.registry.connect();

        let response = build_health_response(&state);

        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.producers, producers(2, 1));
        assert_eq!(response.active_connections, 1);
        assert_eq!(response.version, "0.1.0");
    }

    #[tokio::test]
    async fn readiness_requires_running_producer() {
        let state = state();
        let not_ready = readiness_handler(State(Arc::clone(&state)))
            .await
            .into_response();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.stats.producer_started();
        let ready = readiness_handler(State(state)).await.into_response();
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_unavailable_without_recorder() {
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
