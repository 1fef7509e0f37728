//! Batch Processor
//!
//! Runs one ingestion cycle over a batch of raw records:
//!
//! ```text
//! decode each record ──► append to trade store (best effort)
//!        │
//!        ▼
//! coalesce (last arrival per symbol wins)
//!        │
//!        ▼
//! broadcast ──► evict Gone connections
//! ```
//!
//! Nothing in a cycle is fatal. Malformed records are dropped, store
//! failures are logged, delivery failures are isolated per connection.
//! Re-running a batch only re-sends the same messages.

use std::sync::Arc;
use std::time::Instant;

use super::broadcaster::{Broadcaster, DeliveryOutcome};
use super::stats::PipelineStats;
use crate::application::ports::{RawRecord, TradeStore};
use crate::domain::coalesce::coalesce;
use crate::domain::trade::TradeEvent;
use crate::infrastructure::codec::TradeCodec;
use crate::infrastructure::metrics;

/// Summary of one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Raw records in the batch.
    pub records: usize,
    /// Records decoded successfully.
    pub decoded: usize,
    /// Records dropped as malformed.
    pub rejected: usize,
    /// Distinct symbols after coalescing.
    pub symbols: usize,
    /// Trade store appends that failed.
    pub store_failures: usize,
    /// Broadcast results.
    pub delivery: DeliveryOutcome,
}

/// Decodes, coalesces and broadcasts ingestion batches.
#[derive(Clone)]
pub struct BatchProcessor {
    codec: TradeCodec,
    broadcaster: Broadcaster,
    store: Option<Arc<dyn TradeStore>>,
    stats: Arc<PipelineStats>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("broadcaster", &self.broadcaster)
            .field("store_enabled", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    /// Create a processor. Pass `None` for `store` to skip trade history.
    #[must_use]
    pub fn new(
        broadcaster: Broadcaster,
        store: Option<Arc<dyn TradeStore>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            codec: TradeCodec::new(),
            broadcaster,
            store,
            stats,
        }
    }

    /// Process one batch read from `shard`.
    #[tracing::instrument(level = "debug", skip_all, fields(shard = shard, records = records.len()))]
    pub async fn process_batch(&self, shard: usize, records: &[RawRecord]) -> BatchReport {
        let started = Instant::now();
        metrics::record_records_ingested(shard, records.len() as u64);

        let trades = self.decode_all(shard, records);
        let store_failures = self.store_all(&trades).await;

        let decoded = trades.len();
        let batch = coalesce(trades);
        let delivery = self.broadcaster.broadcast(&batch).await;

        let report = BatchReport {
            records: records.len(),
            decoded,
            rejected: records.len() - decoded,
            symbols: batch.len(),
            store_failures,
            delivery,
        };

        self.stats.record_batch(&report);
        metrics::record_batch_processed(shard, started.elapsed());

        tracing::debug!(
            shard,
            records = report.records,
            rejected = report.rejected,
            symbols = report.symbols,
            delivered = report.delivery.delivered,
            evicted = report.delivery.evictions.len(),
            "Processed batch"
        );

        report
    }

    /// Decode every record, dropping the ones that fail.
    fn decode_all(&self, shard: usize, records: &[RawRecord]) -> Vec<TradeEvent> {
        records
            .iter()
            .filter_map(|record| match self.codec.decode(&record.data) {
                Ok(trade) => Some(trade),
                Err(e) => {
                    metrics::record_decode_error(shard);
                    tracing::warn!(
                        shard,
                        partition_key = %record.partition_key,
                        error = %e,
                        "Dropping malformed record"
                    );
                    None
                }
            })
            .collect()
    }

    /// Append every decoded trade to the store; returns the failure count.
    async fn store_all(&self, trades: &[TradeEvent]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut failures = 0;
        for trade in trades {
            if let Err(e) = store.append(trade).await {
                failures += 1;
                metrics::record_store_error();
                tracing::error!(symbol = %trade.symbol, error = %e, "Error storing trade");
            }
        }
        failures
    }
}
