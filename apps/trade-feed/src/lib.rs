#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Trade Feed - Simulated Market Data Fan-out
//!
//! Generates a stochastic trade stream per instrument, ingests it in
//! batches, keeps the latest trade per symbol and pushes the result to every
//! WebSocket subscriber. Subscribers that have gone away are evicted once a
//! broadcast sweep finishes.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: trade types and pure logic
//!   - `trade`: `TradeEvent` and the subscriber message envelope
//!   - `generator`: momentum random-walk trade generator
//!   - `coalesce`: latest-trade-per-symbol reduction
//!
//! - **Application**: ports and pipeline services
//!   - `ports`: registry, transport, store and publisher contracts
//!   - `services`: producer, ingestion worker, batch processor, broadcaster
//!
//! - **Infrastructure**: adapters and process plumbing
//!   - `codec`, `stream`, `registry`, `store`: port implementations
//!   - `websocket`, `health`: HTTP surfaces
//!   - `config`, `metrics`, `telemetry`: ambient concerns
//!
//! # Data Flow
//!
//! ```text
//! TradeGenerator ─► TradeProducer ─► IngestionStream (sharded)
//!                                          │ batches
//!                                          ▼
//!                    IngestionWorker ─► BatchProcessor ─► TradeStore
//!                                          │ coalesce
//!                                          ▼
//!                                     Broadcaster ─► ConnectionRegistry ─► subscribers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trade types and pure logic with no I/O.
pub mod domain;

/// Application layer - Ports and pipeline services.
pub mod application;

/// Infrastructure layer - Adapters and process plumbing.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::coalesce::{CoalescedBatch, coalesce};
pub use domain::generator::{GeneratorSnapshot, GeneratorState, TradeGenerator};
pub use domain::trade::{Symbol, TradeEvent};

// Ports
pub use application::ports::{
    ConnectionId, ConnectionRegistry, PublishError, PushOutcome, RawRecord, RegistryError,
    StoreError, SubscriberTransport, TradePublisher, TradeStore,
};

// Services
pub use application::services::{
    BatchProcessor, BatchReport, Broadcaster, DeliveryOutcome, IngestionWorker, PipelineSnapshot,
    PipelineStats, ProducerSummary, TradeProducer, WorkerSummary,
};

// Infrastructure
pub use infrastructure::ServerError;
pub use infrastructure::codec::{DecodeError, TradeCodec};
pub use infrastructure::config::{ConfigError, FeedConfig, Ticker, TickerMode};
pub use infrastructure::health::{HealthServer, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::registry::{InMemoryConnectionRegistry, Registration};
pub use infrastructure::store::{FileTradeStore, TradeRecord};
pub use infrastructure::stream::{IngestionPublisher, ShardReceiver, ingestion_stream};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
pub use infrastructure::websocket::SubscriberServer;
