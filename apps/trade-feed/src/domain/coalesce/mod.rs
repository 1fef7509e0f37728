//! Batch Coalescing
//!
//! Reduces one ingestion cycle's trades to a single trade per symbol.
//!
//! The policy is last-occurrence-in-arrival-order wins. Timestamps are not
//! consulted: if the upstream stream reorders records inside a batch, the
//! later-arriving record is still the one broadcast.

use std::collections::BTreeMap;

use crate::domain::trade::{Symbol, TradeEvent};

/// Latest trade per symbol for one ingestion cycle.
///
/// Built fresh per batch and discarded after broadcast. Iterates in symbol
/// order so repeated runs over the same input produce the same sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoalescedBatch {
    latest: BTreeMap<Symbol, TradeEvent>,
}

impl CoalescedBatch {
    /// Number of distinct symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Check if the batch holds no trades.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Trade chosen for `symbol`, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&TradeEvent> {
        self.latest.get(symbol)
    }

    /// Iterate over the chosen trades.
    pub fn iter(&self) -> impl Iterator<Item = &TradeEvent> {
        self.latest.values()
    }

    /// Symbols present in the batch.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.latest.keys().map(String::as_str)
    }

    fn insert(&mut self, trade: TradeEvent) {
        self.latest.insert(trade.symbol.clone(), trade);
    }
}

impl FromIterator<TradeEvent> for CoalescedBatch {
    fn from_iter<I: IntoIterator<Item = TradeEvent>>(iter: I) -> Self {
        let mut batch = Self::default();
        for trade in iter {
            batch.insert(trade);
        }
        batch
    }
}

impl IntoIterator for CoalescedBatch {
    type Item = TradeEvent;
    type IntoIter = std::collections::btree_map::IntoValues<Symbol, TradeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.latest.into_values()
    }
}

/// Keep the last trade per symbol, in arrival order.
pub fn coalesce(trades: impl IntoIterator<Item = TradeEvent>) -> CoalescedBatch {
    trades.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(symbol: &str, timestamp: f64, price: f64) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            timestamp,
            price,
            bid: price - 0.01,
            ask: price + 0.01,
            volume: 1000,
            generated_at: String::new(),
        }
    }

    #[test]
    fn empty_input_yields_empty_batch() {
        let batch = coalesce(Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn one_entry_per_symbol() {
        let batch = coalesce(vec![
            trade("AAPL", 1.0, 150.0),
            trade("MSFT", 1.0, 310.0),
            trade("AAPL", 2.0, 150.5),
            trade("GOOGL", 1.0, 140.0),
        ]);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.symbols().collect::<Vec<_>>(), ["AAPL", "GOOGL", "MSFT"]);
    }

    #[test]
    fn last_arrival_wins_over_newer_timestamp() {
        let batch = coalesce(vec![
            trade("AAPL", 300.0, 151.0),
            trade("AAPL", 100.0, 149.0),
            trade("AAPL", 200.0, 150.0),
        ]);

        let chosen = batch.get("AAPL").unwrap();
        assert!((chosen.price - 150.0).abs() < f64::EPSILON);
        assert!((chosen.timestamp - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn same_input_same_output() {
        let input = vec![
            trade("AAPL", 1.0, 150.0),
            trade("MSFT", 2.0, 310.0),
            trade("AAPL", 3.0, 151.0),
        ];

        assert_eq!(coalesce(input.clone()), coalesce(input));
    }

    #[test]
    fn into_iter_yields_winners() {
        let batch = coalesce(vec![trade("B", 1.0, 2.0), trade("A", 1.0, 1.0)]);
        let symbols: Vec<_> = batch.into_iter().map(|t| t.symbol).collect();
        assert_eq!(symbols, ["A", "B"]);
    }
}
