//! Port Interfaces
//!
//! Contracts between the pipeline and the systems around it. Infrastructure
//! adapters implement these; the application services only see the traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ConnectionRegistry`: enumerate and evict subscriber connections
//! - `SubscriberTransport`: push one serialized message to one connection
//! - `TradeStore`: best-effort trade history sink
//! - `TradePublisher`: hand a generated trade to the ingestion stream
//!
//! `RawRecord` is the unit the ingestion stream carries from the publisher
//! to the batch workers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::trade::TradeEvent;

/// Opaque subscriber connection identifier.
pub type ConnectionId = String;

/// One record as carried by the ingestion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Routing key; the trade symbol.
    pub partition_key: String,
    /// Encoded trade payload.
    pub data: Vec<u8>,
}

// =============================================================================
// Connection Registry
// =============================================================================

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Enumerating connections failed.
    #[error("connection scan failed: {0}")]
    Scan(String),

    /// Removing a connection failed; it stays registered.
    #[error("failed to evict connection {id}: {reason}")]
    Evict {
        /// Connection that could not be removed.
        id: ConnectionId,
        /// Failure description.
        reason: String,
    },
}

/// Keyed store of active subscriber connections.
///
/// Implementations must tolerate concurrent scans and mutations. A
/// connection added during a sweep may or may not appear in it; evicting a
/// connection that is already gone is not an error.
///
/// `list` returns the whole set in one call. Paged enumeration is the
/// extension point for registries too large for a single listing.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Snapshot of currently registered connections.
    async fn list(&self) -> Result<Vec<ConnectionId>, RegistryError>;

    /// Remove a connection.
    async fn evict(&self, id: &str) -> Result<(), RegistryError>;
}

// =============================================================================
// Subscriber Transport
// =============================================================================

/// Result of pushing one message to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message accepted for delivery.
    Delivered,
    /// Peer no longer reachable; the connection should be evicted.
    Gone,
    /// Any other failure; the connection is kept for the next cycle.
    Transient(String),
}

impl PushOutcome {
    /// Label used for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Gone => "gone",
            Self::Transient(_) => "transient",
        }
    }
}

/// Delivers serialized messages to individual connections.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    /// Push `payload` to connection `id`.
    async fn push(&self, id: &str, payload: Arc<str>) -> PushOutcome;
}

// =============================================================================
// Trade Store
// =============================================================================

/// Trade store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Writing to the underlying medium failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failed.
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A trade field could not be represented in the stored record.
    #[error("invalid trade field {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Append-only trade history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist one trade.
    async fn append(&self, trade: &TradeEvent) -> Result<(), StoreError>;
}

// =============================================================================
// Trade Publisher
// =============================================================================

/// Publisher errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The trade could not be encoded.
    #[error("failed to encode trade: {0}")]
    Encode(#[from] serde_json::Error),

    /// The target shard buffer is at capacity.
    #[error("ingestion shard {0} is full")]
    ShardFull(usize),

    /// The target shard has no reader.
    #[error("ingestion shard {0} is closed")]
    StreamClosed(usize),
}

/// Sends generated trades into the ingestion stream.
#[async_trait]
pub trait TradePublisher: Send + Sync {
    /// Publish one trade, partitioned by its symbol.
    async fn publish(&self, trade: &TradeEvent) -> Result<(), PublishError>;
}
