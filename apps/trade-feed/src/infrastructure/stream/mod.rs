//! Ingestion Stream
//!
//! In-process sharded stream between producers and batch workers.
//!
//! # Architecture
//!
//! ```text
//! TradeProducer ─┐                  ┌─► shard 0 ─► chunks_timeout ─► worker 0
//! TradeProducer ─┼─► hash(symbol) ──┤
//! TradeProducer ─┘                  └─► shard 1 ─► chunks_timeout ─► worker 1
//! ```
//!
//! Records with the same partition key always land on the same shard, so
//! per-symbol ordering is preserved within a shard. Each shard is a bounded
//! queue; a full shard refuses the publish rather than blocking the
//! producer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::application::ports::{PublishError, RawRecord, TradePublisher};
use crate::domain::trade::TradeEvent;
use crate::infrastructure::codec::TradeCodec;

/// Create a stream with `shards` shards, each buffering up to `capacity`
/// records.
#[must_use]
pub fn ingestion_stream(shards: usize, capacity: usize) -> (IngestionPublisher, Vec<ShardReceiver>) {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..shards.max(1))
        .map(|shard| {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (tx, ShardReceiver { shard, rx })
        })
        .unzip();

    (
        IngestionPublisher {
            shards: senders,
            codec: TradeCodec::new(),
        },
        receivers,
    )
}

/// Writing side of the ingestion stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestionPublisher {
    shards: Vec<mpsc::Sender<RawRecord>>,
    codec: TradeCodec,
}

impl IngestionPublisher {
    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard a partition key routes to.
    #[must_use]
    pub fn shard_for(&self, partition_key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        let shards = self.shards.len().max(1) as u64;
        #[allow(clippy::cast_possible_truncation)]
        let shard = (hasher.finish() % shards) as usize;
        shard
    }

    /// Put a pre-encoded record on its shard.
    ///
    /// # Errors
    ///
    /// Returns `ShardFull` if the shard is at capacity and `StreamClosed`
    /// if its reader is gone.
    pub fn send_record(&self, record: RawRecord) -> Result<usize, PublishError> {
        let shard = self.shard_for(&record.partition_key);
        let Some(sender) = self.shards.get(shard) else {
            return Err(PublishError::StreamClosed(shard));
        };

        sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::ShardFull(shard),
            mpsc::error::TrySendError::Closed(_) => PublishError::StreamClosed(shard),
        })?;
        Ok(shard)
    }
}

#[async_trait]
impl TradePublisher for IngestionPublisher {
    async fn publish(&self, trade: &TradeEvent) -> Result<(), PublishError> {
        let record = RawRecord {
            partition_key: trade.symbol.clone(),
            data: self.codec.encode_record(trade)?,
        };
        self.send_record(record).map(|_| ())
    }
}

/// Reading side of one shard.
#[derive(Debug)]
pub struct ShardReceiver {
    shard: usize,
    rx: mpsc::Receiver<RawRecord>,
}

impl ShardReceiver {
    /// Shard index.
    #[must_use]
    pub const fn shard(&self) -> usize {
        self.shard
    }

    /// Group records into batches of at most `batch_size`, or whatever
    /// arrived within `window` of the first record of a batch.
    ///
    /// The stream ends once every publisher has been dropped and the shard
    /// is drained.
    pub fn into_batches(
        self,
        batch_size: usize,
        window: Duration,
    ) -> impl Stream<Item = Vec<RawRecord>> + Send {
        ReceiverStream::new(self.rx).chunks_timeout(batch_size.max(1), window)
    }
}
