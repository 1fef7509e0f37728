//! Trade Feed Binary
//!
//! Starts producers, ingestion workers, the subscriber WebSocket server and
//! the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-feed
//! ```
//!
//! # Environment Variables
//!
//! - `TRADE_FEED_TICKERS`: `SYMBOL=PRICE,...` (default: AAPL=150.00,MSFT=310.00,GOOGL=140.00)
//! - `TRADE_FEED_TICKER_MODE`: all | random (default: all)
//! - `TRADE_FREQUENCY`: trades per second per producer (default: 5)
//! - `TRADE_FEED_SEED`: base RNG seed for reproducible runs (default: unset)
//! - `TRADE_FEED_SHARDS`: ingestion shards (default: 2)
//! - `TRADE_FEED_STREAM_CAPACITY`: records buffered per shard (default: 10000)
//! - `TRADE_FEED_BATCH_SIZE`: max records per batch (default: 100)
//! - `TRADE_FEED_BATCH_WINDOW_MS`: batch window (default: 250)
//! - `TRADE_FEED_WS_PORT`: subscriber WebSocket port (default: 8080)
//! - `TRADE_FEED_HEALTH_PORT`: health check HTTP port (default: 8082)
//! - `TRADE_FEED_SUBSCRIBER_QUEUE`: outbound messages per subscriber (default: 256)
//! - `TRADE_FEED_CONNECTION_TTL_SECS`: subscriber registration lifetime (default: 86400)
//! - `TRADE_FEED_STORE_PATH`: trade history file (default: unset, disabled)
//! - `TRADE_FEED_STORE_TTL_SECS`: trade history retention (default: 604800)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: trade_feed=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trade_feed::infrastructure::telemetry;
use trade_feed::{
    BatchProcessor, Broadcaster, FeedConfig, FileTradeStore, HealthServer, HealthServerState,
    InMemoryConnectionRegistry, IngestionWorker, PipelineStats, SubscriberServer, TradeGenerator,
    TradeProducer, TradeStore, ingestion_stream, init_metrics,
};

/// Interval between sweeps for expired subscriber registrations.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting trade feed");

    let _metrics_handle = init_metrics();

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let stats = Arc::new(PipelineStats::new());

    // Subscriber connections double as the push transport
    let registry = Arc::new(InMemoryConnectionRegistry::new(
        config.subscriber.queue_capacity,
        config.subscriber.connection_ttl,
    ));

    let store: Option<Arc<dyn TradeStore>> = match &config.store.path {
        Some(path) => Some(Arc::new(
            FileTradeStore::open(path, config.store.retention)
                .await
                .with_context(|| format!("failed to open trade store at {}", path.display()))?,
        )),
        None => None,
    };

    let broadcaster = Broadcaster::new(registry.clone(), registry.clone());
    let processor = BatchProcessor::new(broadcaster, store, Arc::clone(&stats));

    let (publisher, shard_receivers) =
        ingestion_stream(config.stream.shards, config.stream.capacity);

    // Workers drain their shard to completion once producers stop
    let mut workers = JoinSet::new();
    for receiver in shard_receivers {
        let worker = IngestionWorker::new(receiver.shard(), processor.clone());
        let batches = receiver.into_batches(config.stream.batch_size, config.stream.batch_window);
        workers.spawn(worker.run(batches, CancellationToken::new()));
    }

    let mut selection_rng = StdRng::from_os_rng();
    let tickers = config.producer.select_tickers(&mut selection_rng);
    stats.set_producers_configured(tickers.len());

    let publisher = Arc::new(publisher);
    let mut producers = JoinSet::new();
    for (index, ticker) in (0u64..).zip(tickers) {
        let generator = match config.producer.seed {
            Some(seed) => {
                TradeGenerator::seeded(ticker.symbol, ticker.initial_price, seed.wrapping_add(index))
            }
            None => TradeGenerator::new(ticker.symbol, ticker.initial_price),
        };
        let producer = TradeProducer::new(
            generator,
            publisher.clone(),
            config.producer.trade_frequency,
            Arc::clone(&stats),
        );
        producers.spawn(producer.run(shutdown_token.clone()));
    }
    // Shards close once every producer has dropped its publisher
    drop(publisher);

    let subscriber_server = SubscriberServer::new(
        config.server.ws_port,
        Arc::clone(&registry),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = subscriber_server.run().await {
            tracing::error!(error = %e, "Subscriber server error");
        }
    });

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION"),
        Arc::clone(&stats),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tokio::spawn(purge_expired_connections(
        Arc::clone(&registry),
        shutdown_token.clone(),
    ));

    tracing::info!("Trade feed ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let mut published = 0;
        while let Some(result) = producers.join_next().await {
            match result {
                Ok(summary) => published += summary.published,
                Err(e) => tracing::error!(error = %e, "Producer task failed"),
            }
        }
        let mut batches = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(summary) => batches += summary.batches,
                Err(e) => tracing::error!(error = %e, "Ingestion worker task failed"),
            }
        }
        (published, batches)
    })
    .await;

    match drained {
        Ok((published, batches)) => {
            tracing::info!(published, batches, "Pipeline drained");
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Shutdown timed out, abandoning in-flight work"
            );
        }
    }

    tracing::info!("Trade feed stopped");
    Ok(())
}

/// Periodically drop subscriber registrations past their expiry.
async fn purge_expired_connections(
    registry: Arc<InMemoryConnectionRegistry>,
    shutdown_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            _ = interval.tick() => {
                let purged = registry.purge_expired();
                if purged > 0 {
                    tracing::info!(purged, "Removed expired subscriber registrations");
                }
            }
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    let tickers: Vec<&str> = config
        .producer
        .tickers
        .iter()
        .map(|t| t.symbol.as_str())
        .collect();

    tracing::info!(
        tickers = ?tickers,
        ticker_mode = config.producer.ticker_mode.as_str(),
        trade_frequency = config.producer.trade_frequency,
        seeded = config.producer.seed.is_some(),
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        shards = config.stream.shards,
        capacity = config.stream.capacity,
        batch_size = config.stream.batch_size,
        batch_window_ms = config.stream.batch_window.as_millis(),
        subscriber_queue = config.subscriber.queue_capacity,
        connection_ttl_secs = config.subscriber.connection_ttl.as_secs(),
        store_path = ?config.store.path,
        "Pipeline settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
