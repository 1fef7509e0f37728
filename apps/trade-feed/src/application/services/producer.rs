//! Trade Producer
//!
//! Drives one [`TradeGenerator`] at a fixed rate and publishes every trade
//! to the ingestion stream. Publish failures are logged and the loop keeps
//! going; only successful publishes count toward throughput.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use super::stats::PipelineStats;
use crate::application::ports::{PublishError, TradePublisher};
use crate::domain::generator::TradeGenerator;
use crate::domain::trade::TradeEvent;
use crate::infrastructure::metrics;

/// Progress is logged every this many published trades.
const LOG_EVERY: u64 = 10;

/// Fallback rate when the configured one is unusable.
const DEFAULT_TRADE_FREQUENCY: f64 = 5.0;

/// Totals reported when a producer stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerSummary {
    /// Trades accepted by the stream.
    pub published: u64,
    /// Trades the stream refused.
    pub failed: u64,
    /// Wall time the producer ran.
    pub elapsed: Duration,
}

/// Generates and publishes trades for one instrument.
pub struct TradeProducer<R = StdRng> {
    task_id: String,
    generator: TradeGenerator<R>,
    publisher: Arc<dyn TradePublisher>,
    interval: Duration,
    stats: Arc<PipelineStats>,
}

impl<R: Rng + Send> TradeProducer<R> {
    /// Create a producer emitting `trade_frequency` trades per second.
    #[must_use]
    pub fn new(
        generator: TradeGenerator<R>,
        publisher: Arc<dyn TradePublisher>,
        trade_frequency: f64,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let mut task_id = uuid::Uuid::new_v4().simple().to_string();
        task_id.truncate(8);

        Self {
            task_id,
            generator,
            publisher,
            interval: interval_for(trade_frequency),
            stats,
        }
    }

    /// Short identifier used in log lines.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Delay between trades.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Generate one trade and publish it.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if the ingestion stream refuses the trade.
    pub async fn tick(&mut self) -> Result<TradeEvent, PublishError> {
        let trade = self.generator.generate_trade();
        match self.publisher.publish(&trade).await {
            Ok(()) => {
                self.stats.trade_published();
                metrics::record_trade_published(&trade.symbol);
                Ok(trade)
            }
            Err(e) => {
                self.stats.publish_failed();
                metrics::record_publish_error(&trade.symbol);
                Err(e)
            }
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> ProducerSummary {
        let started = Instant::now();
        let mut published = 0u64;
        let mut failed = 0u64;

        self.stats.producer_started();
        let state = self.generator.get_current_state();
        tracing::info!(
            task_id = %self.task_id,
            symbol = %state.symbol,
            initial_price = state.price,
            interval_ms = self.interval.as_millis(),
            "Starting trade producer"
        );

        loop {
            match self.tick().await {
                Ok(_) => {
                    published += 1;
                    if published % LOG_EVERY == 0 {
                        self.log_progress(published, started.elapsed());
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(task_id = %self.task_id, error = %e, "Error publishing trade");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        self.stats.producer_stopped();
        let elapsed = started.elapsed();
        tracing::info!(
            task_id = %self.task_id,
            symbol = %self.generator.symbol(),
            total_trades = published,
            failed,
            elapsed_secs = elapsed.as_secs_f64(),
            "Trade producer stopped"
        );

        ProducerSummary {
            published,
            failed,
            elapsed,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn log_progress(&self, published: u64, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { published as f64 / secs } else { 0.0 };
        let state = self.generator.get_current_state();
        tracing::info!(
            task_id = %self.task_id,
            symbol = %state.symbol,
            trades = published,
            rate = %format!("{rate:.2}"),
            price = state.price,
            momentum_pct = state.momentum_pct,
            "Producer progress"
        );
    }
}

/// Delay between trades for a rate in trades per second.
fn interval_for(trade_frequency: f64) -> Duration {
    let frequency = if trade_frequency.is_finite() && trade_frequency > 0.0 {
        trade_frequency
    } else {
        DEFAULT_TRADE_FREQUENCY
    };
    Duration::from_secs_f64(1.0 / frequency)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct CollectingPublisher {
        trades: Mutex<Vec<TradeEvent>>,
        refuse: bool,
    }

    #[async_trait]
    impl TradePublisher for CollectingPublisher {
        async fn publish(&self, trade: &TradeEvent) -> Result<(), PublishError> {
            if self.refuse {
                return Err(PublishError::StreamClosed(0));
            }
            self.trades.lock().push(trade.clone());
            Ok(())
        }
    }

    fn producer(publisher: Arc<CollectingPublisher>) -> (TradeProducer, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let producer = TradeProducer::new(
            TradeGenerator::seeded("AAPL", 150.0, 9),
            publisher,
            1000.0,
            Arc::clone(&stats),
        );
        (producer, stats)
    }

    #[test]
    fn interval_from_frequency() {
        assert_eq!(interval_for(5.0), Duration::from_millis(200));
        assert_eq!(interval_for(0.5), Duration::from_secs(2));
        assert_eq!(interval_for(0.0), Duration::from_millis(200));
        assert_eq!(interval_for(f64::NAN), Duration::from_millis(200));
    }

    #[test]
    fn task_id_is_short() {
        let (producer, _) = producer(Arc::new(CollectingPublisher::default()));
        assert_eq!(producer.task_id().len(), 8);
    }

    #[tokio::test]
    async fn tick_publishes_trade() {
        let publisher = Arc::new(CollectingPublisher::default());
        let (mut producer, stats) = producer(Arc::clone(&publisher));

        let trade = producer.tick().await.unwrap();

        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(publisher.trades.lock().len(), 1);
        assert_eq!(stats.snapshot().trades_published, 1);
    }

    #[tokio::test]
    async fn refused_publish_is_counted() {
        let publisher = Arc::new(CollectingPublisher {
            refuse: true,
            ..CollectingPublisher::default()
        });
        let (mut producer, stats) = producer(publisher);

        assert!(producer.tick().await.is_err());
        assert_eq!(stats.snapshot().publish_failures, 1);
        assert_eq!(stats.snapshot().trades_published, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let publisher = Arc::new(CollectingPublisher::default());
        let (producer, stats) = producer(Arc::clone(&publisher));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(producer.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert!(summary.published >= 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(publisher.trades.lock().len() as u64, summary.published);
        assert_eq!(stats.snapshot().producers_running, 0);
    }
}
