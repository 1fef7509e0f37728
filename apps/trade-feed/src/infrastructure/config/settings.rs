//! Feed Configuration Settings
//!
//! Configuration types for the trade feed, loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use rand::seq::IndexedRandom;

const DEFAULT_TICKERS: &str = "AAPL=150.00,MSFT=310.00,GOOGL=140.00";

/// One simulated instrument and its starting price.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    /// Instrument symbol.
    pub symbol: String,
    /// Price the generator starts from.
    pub initial_price: f64,
}

impl Ticker {
    /// Parse a comma-separated list of `SYMBOL=PRICE` entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTicker` for a malformed entry and
    /// `ConfigError::NoTickers` if the list is empty.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ConfigError> {
        let tickers = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Self>, _>>()?;

        if tickers.is_empty() {
            return Err(ConfigError::NoTickers);
        }
        Ok(tickers)
    }
}

impl FromStr for Ticker {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidTicker {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (symbol, price) = entry
            .split_once('=')
            .ok_or_else(|| invalid("expected SYMBOL=PRICE"))?;

        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(invalid("empty symbol"));
        }

        let initial_price: f64 = price
            .trim()
            .parse()
            .map_err(|_| invalid("price is not a number"))?;
        if !initial_price.is_finite() || initial_price <= 0.0 {
            return Err(invalid("price must be positive"));
        }

        Ok(Self {
            symbol: symbol.to_uppercase(),
            initial_price,
        })
    }
}

/// Which configured tickers get a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickerMode {
    /// One producer per configured ticker.
    #[default]
    All,
    /// A single producer on one ticker picked at random.
    Random,
}

impl TickerMode {
    /// Parse mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "random" => Self::Random,
            _ => Self::All,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Random => "random",
        }
    }
}

/// Trade producer settings.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Configured instruments.
    pub tickers: Vec<Ticker>,
    /// How tickers map to producers.
    pub ticker_mode: TickerMode,
    /// Trades per second per producer.
    pub trade_frequency: f64,
    /// Base RNG seed; producer `i` uses `seed + i`. `None` uses OS entropy.
    pub seed: Option<u64>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            tickers: Ticker::parse_list(DEFAULT_TICKERS).unwrap_or_default(),
            ticker_mode: TickerMode::All,
            trade_frequency: 5.0,
            seed: None,
        }
    }
}

impl ProducerSettings {
    /// Tickers that get a producer under the configured mode.
    pub fn select_tickers<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Ticker> {
        match self.ticker_mode {
            TickerMode::All => self.tickers.clone(),
            TickerMode::Random => self.tickers.choose(rng).cloned().into_iter().collect(),
        }
    }
}

/// Ingestion stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Number of shards, each drained by one worker.
    pub shards: usize,
    /// Buffered records per shard before publishes are refused.
    pub capacity: usize,
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Maximum time to wait while filling a batch.
    pub batch_window: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            shards: 2,
            capacity: 10_000,
            batch_size: 100,
            batch_window: Duration::from_millis(250),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Subscriber WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8082,
        }
    }
}

/// Subscriber connection settings.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    /// Outbound messages buffered per connection.
    pub queue_capacity: usize,
    /// Registration lifetime of a connection.
    pub connection_ttl: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            connection_ttl: Duration::from_secs(86_400),
        }
    }
}

/// Trade history settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// JSON-lines file to append to. `None` disables the store.
    pub path: Option<PathBuf>,
    /// Retention written into each record's `ttl`.
    pub retention: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: None,
            retention: Duration::from_secs(604_800),
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    /// Producer settings.
    pub producer: ProducerSettings,
    /// Ingestion stream settings.
    pub stream: StreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Subscriber connection settings.
    pub subscriber: SubscriberSettings,
    /// Trade history settings.
    pub store: StoreSettings,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker list is malformed or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker list is malformed or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let tickers = Ticker::parse_list(
            &env.get("TRADE_FEED_TICKERS")
                .unwrap_or_else(|| DEFAULT_TICKERS.to_string()),
        )?;

        let producer = ProducerSettings {
            tickers,
            ticker_mode: env
                .get("TRADE_FEED_TICKER_MODE")
                .map(|s| TickerMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            trade_frequency: env.parse_f64(
                "TRADE_FREQUENCY",
                ProducerSettings::default().trade_frequency,
            ),
            seed: env.get("TRADE_FEED_SEED").and_then(|v| v.trim().parse().ok()),
        };

        let stream = StreamSettings {
            shards: env
                .parse_usize("TRADE_FEED_SHARDS", StreamSettings::default().shards)
                .max(1),
            capacity: env
                .parse_usize("TRADE_FEED_STREAM_CAPACITY", StreamSettings::default().capacity)
                .max(1),
            batch_size: env
                .parse_usize("TRADE_FEED_BATCH_SIZE", StreamSettings::default().batch_size)
                .max(1),
            batch_window: env.parse_duration_millis(
                "TRADE_FEED_BATCH_WINDOW_MS",
                StreamSettings::default().batch_window,
            ),
        };

        let server = ServerSettings {
            ws_port: env.parse_u16("TRADE_FEED_WS_PORT", ServerSettings::default().ws_port),
            health_port: env.parse_u16(
                "TRADE_FEED_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let subscriber = SubscriberSettings {
            queue_capacity: env
                .parse_usize(
                    "TRADE_FEED_SUBSCRIBER_QUEUE",
                    SubscriberSettings::default().queue_capacity,
                )
                .max(1),
            connection_ttl: env.parse_duration_secs(
                "TRADE_FEED_CONNECTION_TTL_SECS",
                SubscriberSettings::default().connection_ttl,
            ),
        };

        let store = StoreSettings {
            path: env
                .get("TRADE_FEED_STORE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            retention: env.parse_duration_secs(
                "TRADE_FEED_STORE_TTL_SECS",
                StoreSettings::default().retention,
            ),
        };

        Ok(Self {
            producer,
            stream,
            server,
            subscriber,
            store,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A ticker entry could not be parsed.
    #[error("invalid ticker '{entry}': {reason}")]
    InvalidTicker {
        /// The offending entry.
        entry: String,
        /// What was wrong with it.
        reason: String,
    },
    /// No tickers were configured.
    #[error("no tickers configured")]
    NoTickers,
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse_u16(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
