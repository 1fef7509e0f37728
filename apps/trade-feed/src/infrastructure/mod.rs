//! Infrastructure Layer
//!
//! Adapters implementing the application ports plus the process plumbing:
//!
//! - `codec`: JSON trade encoding and validation
//! - `config`: environment configuration
//! - `registry`: in-memory connection registry and push transport
//! - `stream`: sharded in-process ingestion stream
//! - `store`: JSON-lines trade history
//! - `websocket`: subscriber WebSocket server
//! - `health`: health, readiness and metrics HTTP endpoints
//! - `metrics`: Prometheus recorder and metric helpers
//! - `telemetry`: tracing subscriber and OTLP export

pub mod codec;
pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod websocket;

/// HTTP/WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
