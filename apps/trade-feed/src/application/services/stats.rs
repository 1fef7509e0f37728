//! Pipeline counters shared between producers, workers and the health
//! endpoint.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::processor::BatchReport;

/// Live pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    producers_configured: AtomicUsize,
    producers_running: AtomicUsize,
    trades_published: AtomicU64,
    publish_failures: AtomicU64,
    batches_processed: AtomicU64,
    records_ingested: AtomicU64,
    records_rejected: AtomicU64,
    messages_delivered: AtomicU64,
    transient_failures: AtomicU64,
    connections_evicted: AtomicU64,
    store_failures: AtomicU64,
    last_batch_at: RwLock<Option<DateTime<Utc>>>,
}

impl PipelineStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how many producers the process intends to run.
    pub fn set_producers_configured(&self, count: usize) {
        self.producers_configured.store(count, Ordering::Relaxed);
    }

    /// Mark a producer as running.
    pub fn producer_started(&self) {
        self.producers_running.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a producer as stopped.
    pub fn producer_stopped(&self) {
        let _ = self
            .producers_running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Count a published trade.
    pub fn trade_published(&self) {
        self.trades_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed publish.
    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished ingestion cycle into the totals.
    pub fn record_batch(&self, report: &BatchReport) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.records_ingested
            .fetch_add(report.records as u64, Ordering::Relaxed);
        self.records_rejected
            .fetch_add(report.rejected as u64, Ordering::Relaxed);
        self.messages_delivered
            .fetch_add(report.delivery.delivered as u64, Ordering::Relaxed);
        self.transient_failures
            .fetch_add(report.delivery.transient_failures as u64, Ordering::Relaxed);
        self.connections_evicted.fetch_add(
            (report.delivery.evictions.len() - report.delivery.eviction_failures) as u64,
            Ordering::Relaxed,
        );
        self.store_failures
            .fetch_add(report.store_failures as u64, Ordering::Relaxed);
        *self.last_batch_at.write() = Some(Utc::now());
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            producers_configured: self.producers_configured.load(Ordering::Relaxed),
            producers_running: self.producers_running.load(Ordering::Relaxed),
            trades_published: self.trades_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            last_batch_at: *self.last_batch_at.read(),
        }
    }
}

/// Serializable copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    /// Producers configured at startup.
    pub producers_configured: usize,
    /// Producers currently running.
    pub producers_running: usize,
    /// Trades accepted by the ingestion stream.
    pub trades_published: u64,
    /// Trades the ingestion stream refused.
    pub publish_failures: u64,
    /// Completed ingestion cycles.
    pub batches_processed: u64,
    /// Records read from the stream.
    pub records_ingested: u64,
    /// Records dropped by the decoder.
    pub records_rejected: u64,
    /// Successful per-connection pushes.
    pub messages_delivered: u64,
    /// Pushes that failed transiently.
    pub transient_failures: u64,
    /// Connections removed after a Gone push.
    pub connections_evicted: u64,
    /// Trade history appends that failed.
    pub store_failures: u64,
    /// Completion time of the most recent cycle.
    pub last_batch_at: Option<DateTime<Utc>>,
}
