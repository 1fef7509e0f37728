//! Prometheus Metrics Module
//!
//! Exposes feed metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Production**: Trades generated and published per symbol
//! - **Ingestion**: Records read, decode failures, batches processed
//! - **Delivery**: Messages sent, push failures by kind, evictions
//! - **Latency**: Batch processing duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder, so
//! library code and tests can call them freely.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::PushOutcome;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Production
    describe_counter!(
        "trade_feed_trades_published_total",
        "Total trades published to the ingestion stream"
    );
    describe_counter!(
        "trade_feed_publish_errors_total",
        "Total trades the ingestion stream refused"
    );

    // Ingestion
    describe_counter!(
        "trade_feed_records_ingested_total",
        "Total raw records read from the ingestion stream"
    );
    describe_counter!(
        "trade_feed_decode_errors_total",
        "Total records dropped as malformed"
    );
    describe_counter!(
        "trade_feed_batches_processed_total",
        "Total ingestion cycles completed"
    );
    describe_counter!(
        "trade_feed_store_errors_total",
        "Total trade history appends that failed"
    );

    // Delivery
    describe_counter!(
        "trade_feed_messages_sent_total",
        "Total per-connection pushes by outcome"
    );
    describe_counter!(
        "trade_feed_connections_evicted_total",
        "Total connections removed after a Gone push"
    );
    describe_counter!(
        "trade_feed_eviction_errors_total",
        "Total evictions that failed and were left for a later cycle"
    );
    describe_gauge!(
        "trade_feed_active_connections",
        "Number of registered subscriber connections"
    );

    // Latency
    describe_histogram!(
        "trade_feed_batch_processing_seconds",
        "Time to decode, coalesce and broadcast one batch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a trade published by a producer.
pub fn record_trade_published(symbol: &str) {
    counter!(
        "trade_feed_trades_published_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a publish the ingestion stream refused.
pub fn record_publish_error(symbol: &str) {
    counter!(
        "trade_feed_publish_errors_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record raw records read from one shard.
pub fn record_records_ingested(shard: usize, count: u64) {
    counter!(
        "trade_feed_records_ingested_total",
        "shard" => shard.to_string()
    )
    .increment(count);
}

/// Record a record dropped by the decoder.
pub fn record_decode_error(shard: usize) {
    counter!(
        "trade_feed_decode_errors_total",
        "shard" => shard.to_string()
    )
    .increment(1);
}

/// Record a trade history append failure.
pub fn record_store_error() {
    counter!("trade_feed_store_errors_total").increment(1);
}

/// Record a push outcome.
pub fn record_push(outcome: &PushOutcome) {
    counter!(
        "trade_feed_messages_sent_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record connections evicted at the end of a cycle.
pub fn record_evictions(count: u64) {
    counter!("trade_feed_connections_evicted_total").increment(count);
}

/// Record an eviction that failed.
pub fn record_eviction_error() {
    counter!("trade_feed_eviction_errors_total").increment(1);
}

/// Update the registered connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_connections(count: usize) {
    gauge!("trade_feed_active_connections").set(count as f64);
}

/// Record a completed ingestion cycle.
pub fn record_batch_processed(shard: usize, duration: Duration) {
    counter!(
        "trade_feed_batches_processed_total",
        "shard" => shard.to_string()
    )
    .increment(1);
    histogram!(
        "trade_feed_batch_processing_seconds",
        "shard" => shard.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_trade_published("AAPL");
        record_push(&PushOutcome::Gone);
        record_batch_processed(0, Duration::from_millis(3));
        set_active_connections(4);
    }

    #[test]
    fn handle_absent_before_init() {
        // Tests never install the global recorder.
        assert!(get_metrics_handle().is_none());
    }
}
