//! Ingestion worker: pulls batches from one shard and runs them through the
//! [`BatchProcessor`] until the stream ends or shutdown is requested.

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::processor::{BatchProcessor, BatchReport};
use crate::application::ports::RawRecord;

/// Totals for one worker's lifetime, returned when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Batches processed.
    pub batches: u64,
    /// Raw records across those batches.
    pub records: u64,
    /// Records dropped as malformed.
    pub rejected: u64,
    /// Connections evicted after a sweep.
    pub evicted: u64,
}

impl WorkerSummary {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.records += report.records as u64;
        self.rejected += report.rejected as u64;
        self.evicted += report.delivery.evictions.len() as u64;
    }
}

/// Consumes one shard of the ingestion stream.
#[derive(Debug, Clone)]
pub struct IngestionWorker {
    shard: usize,
    processor: BatchProcessor,
}

impl IngestionWorker {
    /// Create a worker for `shard`.
    #[must_use]
    pub const fn new(shard: usize, processor: BatchProcessor) -> Self {
        Self { shard, processor }
    }

    /// Shard this worker reads.
    #[must_use]
    pub const fn shard(&self) -> usize {
        self.shard
    }

    /// Process batches until `batches` ends or `cancel` fires.
    ///
    /// Cancellation is only observed between batches; a batch that has
    /// started always completes.
    pub async fn run<S>(self, batches: S, cancel: CancellationToken) -> WorkerSummary
    where
        S: Stream<Item = Vec<RawRecord>> + Send,
    {
        tracing::info!(shard = self.shard, "Starting ingestion worker");
        futures::pin_mut!(batches);

        let mut summary = WorkerSummary::default();
        loop {
            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = batches.next() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let report = self.processor.process_batch(self.shard, &batch).await;
            if report.rejected > 0 || !report.delivery.evictions.is_empty() {
                tracing::debug!(
                    shard = self.shard,
                    rejected = report.rejected,
                    evicted = report.delivery.evictions.len(),
                    "Batch dropped records or connections"
                );
            }
            summary.record(&report);
        }

        tracing::info!(
            shard = self.shard,
            batches = summary.batches,
            records = summary.records,
            rejected = summary.rejected,
            evicted = summary.evicted,
            "Ingestion worker stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{
        ConnectionId, ConnectionRegistry, PushOutcome, RegistryError, SubscriberTransport,
    };
    use crate::application::services::{Broadcaster, PipelineStats};

    #[derive(Default)]
    struct Sink {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubscriberTransport for Sink {
        async fn push(&self, _id: &str, payload: Arc<str>) -> PushOutcome {
            self.payloads.lock().push(payload.to_string());
            PushOutcome::Delivered
        }
    }

    #[async_trait]
    impl ConnectionRegistry for Sink {
        async fn list(&self) -> Result<Vec<ConnectionId>, RegistryError> {
            Ok(vec!["c1".to_string()])
        }

        async fn evict(&self, _id: &str) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    fn record(symbol: &str, price: f64) -> RawRecord {
        RawRecord {
            partition_key: symbol.to_string(),
            data: format!(
                r#"{{"symbol":"{symbol}","timestamp":1.0,"price":{price},"bid":{},"ask":{},"volume":10}}"#,
                price - 0.01,
                price + 0.01
            )
            .into_bytes(),
        }
    }

    fn worker() -> (IngestionWorker, Arc<Sink>, Arc<PipelineStats>) {
        let sink = Arc::new(Sink::default());
        let stats = Arc::new(PipelineStats::new());
        let broadcaster = Broadcaster::new(sink.clone(), sink.clone());
        let processor = BatchProcessor::new(broadcaster, None, Arc::clone(&stats));
        (IngestionWorker::new(3, processor), sink, stats)
    }

    #[tokio::test]
    async fn processes_every_batch_until_stream_ends() {
        let (worker, sink, stats) = worker();
        let batches = futures::stream::iter(vec![
            vec![record("AAPL", 150.0), record("AAPL", 151.0)],
            vec![record("MSFT", 310.0)],
        ]);

        let summary = worker.run(batches, CancellationToken::new()).await;

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(sink.payloads.lock().len(), 2);
        assert_eq!(stats.snapshot().records_ingested, 3);
    }

    #[tokio::test]
    async fn cancelled_worker_stops_before_next_batch() {
        let (worker, sink, _stats) = worker();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = worker
            .run(futures::stream::iter(vec![vec![record("AAPL", 150.0)]]), cancel)
            .await;

        assert_eq!(summary, WorkerSummary::default());
        assert!(sink.payloads.lock().is_empty());
    }

    #[tokio::test]
    async fn pending_stream_exits_on_cancel() {
        let (worker, _sink, _stats) = worker();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(worker.run(futures::stream::pending(), cancel.clone()));
        cancel.cancel();

        assert_eq!(handle.await.unwrap().batches, 0);
    }

    #[tokio::test]
    async fn summary_counts_rejected_records() {
        let (worker, sink, _stats) = worker();
        let junk = RawRecord {
            partition_key: "JUNK".to_string(),
            data: b"{}".to_vec(),
        };
        let batches = futures::stream::iter(vec![
            vec![record("AAPL", 150.0), junk.clone()],
            vec![junk, record("MSFT", 310.0)],
        ]);

        let summary = worker.run(batches, CancellationToken::new()).await;

        assert_eq!(
            summary,
            WorkerSummary {
                batches: 2,
                records: 4,
                rejected: 2,
                evicted: 0,
            }
        );
        assert_eq!(sink.payloads.lock().len(), 2);
    }
}
