//! Trade History Store
//!
//! Appends every decoded trade to a JSON-lines file. Prices are written as
//! exact decimals parsed from the shortest float representation, and each
//! record carries a `ttl` (epoch seconds) after which it may be discarded.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::application::ports::{StoreError, TradeStore};
use crate::domain::trade::TradeEvent;

/// Default retention: seven days.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(604_800);

/// One persisted trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Instrument symbol.
    pub symbol: String,
    /// Event time, epoch seconds.
    pub timestamp: Decimal,
    /// Trade price.
    pub price: Decimal,
    /// Shares traded.
    pub volume: u64,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Expiry, epoch seconds.
    pub ttl: i64,
}

impl TradeRecord {
    /// Build a record from a trade, expiring `retention` after the trade's
    /// whole-second timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidField` if a value is not finite.
    pub fn from_trade(trade: &TradeEvent, retention: Duration) -> Result<Self, StoreError> {
        let timestamp = to_decimal("timestamp", trade.timestamp)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ttl = (trade.timestamp.floor() as i64).saturating_add(retention.as_secs() as i64);

        Ok(Self {
            symbol: trade.symbol.clone(),
            timestamp,
            price: to_decimal("price", trade.price)?,
            volume: trade.volume,
            bid: to_decimal("bid", trade.bid)?,
            ask: to_decimal("ask", trade.ask)?,
            ttl,
        })
    }
}

fn to_decimal(field: &'static str, value: f64) -> Result<Decimal, StoreError> {
    let invalid = || StoreError::InvalidField {
        field,
        value: value.to_string(),
    };
    if !value.is_finite() {
        return Err(invalid());
    }
    Decimal::from_str(&value.to_string()).map_err(|_| invalid())
}

/// JSON-lines trade store.
#[derive(Debug)]
pub struct FileTradeStore {
    path: PathBuf,
    retention: Duration,
    file: Mutex<File>,
}

impl FileTradeStore {
    /// Open (or create) `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file or its parent directory cannot
    /// be created.
    pub async fn open(path: impl AsRef<Path>, retention: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(path = %path.display(), retention_secs = retention.as_secs(), "Trade store opened");

        Ok(Self {
            path,
            retention,
            file: Mutex::new(file),
        })
    }

    /// File being appended to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TradeStore for FileTradeStore {
    async fn append(&self, trade: &TradeEvent) -> Result<(), StoreError> {
        let record = TradeRecord::from_trade(trade, self.retention)?;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
