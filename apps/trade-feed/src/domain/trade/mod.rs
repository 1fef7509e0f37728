//! Trade Types
//!
//! Canonical in-process representation of a simulated trade and the
//! envelope pushed to subscribers.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"symbol": "AAPL", "timestamp": 1718000000.123, "price": 150.02,
//!  "bid": 150.0, "ask": 150.03, "volume": 1200,
//!  "datetime": "2024-06-10T06:13:20.123000Z"}
//! ```

use serde::{Deserialize, Deserializer, Serialize};

/// A symbol string (stock ticker).
pub type Symbol = String;

/// One simulated execution report for an instrument.
///
/// Immutable once constructed. The generator guarantees `bid < price < ask`;
/// downstream stages do not re-validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Ticker symbol.
    pub symbol: Symbol,

    /// Seconds since the Unix epoch at generation time.
    pub timestamp: f64,

    /// Trade price, rounded to cents.
    pub price: f64,

    /// Best bid, rounded to cents.
    pub bid: f64,

    /// Best ask, rounded to cents.
    pub ask: f64,

    /// Trade size in shares.
    pub volume: u64,

    /// ISO-8601 generation time, informational only.
    ///
    /// Empty when the record carried none (absent or `null`); an empty value
    /// is omitted on the wire.
    #[serde(
        rename = "datetime",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub generated_at: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Envelope for messages pushed to subscribers.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "trade", "data": {"symbol": "AAPL", ...}}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SubscriberMessage<'a> {
    /// Latest trade for one symbol.
    Trade(&'a TradeEvent),
}
