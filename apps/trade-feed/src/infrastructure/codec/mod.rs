//! Trade Codec
//!
//! JSON encoding and decoding for the two wire formats the feed uses:
//!
//! - **Ingestion records**: one bare trade object per stream record
//! - **Subscriber messages**: the trade wrapped in a `{"type":"trade"}`
//!   envelope
//!
//! Decoding is per record so that one malformed payload cannot take the
//! rest of its batch down with it.

use crate::domain::trade::{SubscriberMessage, TradeEvent};

/// Decode errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not JSON, or a required field is missing or mistyped.
    #[error("malformed trade record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Symbol present but empty.
    #[error("trade record has an empty symbol")]
    EmptySymbol,

    /// A price, quote or size that must be positive is not.
    #[error("trade record field '{field}' must be positive")]
    NonPositive {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// JSON codec for trade records and subscriber messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct TradeCodec;

impl TradeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one ingestion record.
    ///
    /// Requires `symbol`, `timestamp`, `price`, `bid`, `ask` and an integer
    /// `volume`; `datetime` is optional and may be `null`. Unknown fields are
    /// ignored. Prices must be finite and positive and `volume` at least 1.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the payload is not a valid trade record.
    pub fn decode(&self, data: &[u8]) -> Result<TradeEvent, DecodeError> {
        let trade: TradeEvent = serde_json::from_slice(data)?;
        if trade.symbol.trim().is_empty() {
            return Err(DecodeError::EmptySymbol);
        }
        for (field, value) in [("price", trade.price), ("bid", trade.bid), ("ask", trade.ask)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(DecodeError::NonPositive { field });
            }
        }
        if trade.volume == 0 {
            return Err(DecodeError::NonPositive { field: "volume" });
        }
        Ok(trade)
    }

    /// Encode a trade as an ingestion record payload.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_record(&self, trade: &TradeEvent) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(trade)
    }

    /// Encode a trade as the subscriber message envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_message(&self, trade: &TradeEvent) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SubscriberMessage::Trade(trade))
    }
}
