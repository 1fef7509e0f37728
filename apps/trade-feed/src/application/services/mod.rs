//! Application Services
//!
//! The pipeline stages, wired together through the ports:
//!
//! - [`TradeProducer`]: generator loop publishing to the ingestion stream
//! - [`IngestionWorker`]: per-shard batch consumer
//! - [`BatchProcessor`]: decode, store, coalesce and broadcast one batch
//! - [`Broadcaster`]: fan-out with deferred eviction
//! - [`PipelineStats`]: counters shared with the health endpoint

mod broadcaster;
mod processor;
mod producer;
mod stats;
mod worker;

pub use broadcaster::{Broadcaster, DeliveryOutcome, EvictionSet};
pub use processor::{BatchProcessor, BatchReport};
pub use producer::{ProducerSummary, TradeProducer};
pub use stats::{PipelineSnapshot, PipelineStats};
pub use worker::{IngestionWorker, WorkerSummary};
