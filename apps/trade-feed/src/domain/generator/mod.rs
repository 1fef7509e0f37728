//! Stochastic Trade Generator
//!
//! Per-instrument random walk with decaying momentum. Each call to
//! [`TradeGenerator::generate_trade`] advances the walk by one tick and
//! emits a [`TradeEvent`].
//!
//! # Model
//!
//! ```text
//! momentum' = momentum * 0.95 + N(0, 0.0005)
//! price'    = max(price * (1 + N(momentum', 0.001)), 1.0)
//! bid/ask   = price' -/+ price' * 0.0002 / 2
//! volume    = 1000 * U[5, 20]   with p = 0.05
//!             1000 * U[0.5, 2]  otherwise
//! ```
//!
//! The entropy source is a type parameter so tests can pin exact sequences
//! with a seeded RNG.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::domain::trade::{Symbol, TradeEvent};

// =============================================================================
// Simulation Constants
// =============================================================================

/// Bid/ask spread as a fraction of price (0.02%).
pub const SPREAD_FRACTION: f64 = 0.0002;

/// Standard deviation of the per-tick price change fraction.
pub const VOLATILITY: f64 = 0.001;

/// Momentum decay applied every tick.
pub const MOMENTUM_DECAY: f64 = 0.95;

/// Standard deviation of the momentum noise term.
pub const MOMENTUM_NOISE: f64 = 0.0005;

/// Base trade size in shares.
pub const VOLUME_BASE: f64 = 1000.0;

/// Probability that a tick is a block trade.
pub const LARGE_TRADE_PROBABILITY: f64 = 0.05;

/// Volume multiplier range for block trades.
pub const LARGE_TRADE_MULTIPLIER: (f64, f64) = (5.0, 20.0);

/// Volume multiplier range for ordinary trades.
pub const NORMAL_TRADE_MULTIPLIER: (f64, f64) = (0.5, 2.0);

/// Lowest price the walk can reach.
pub const PRICE_FLOOR: f64 = 1.0;

const CENT: f64 = 0.01;

// =============================================================================
// Generator State
// =============================================================================

/// Mutable walk state for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorState {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Unrounded current price, always `>= PRICE_FLOOR` after the first tick.
    pub current_price: f64,
    /// Signed directional bias carried between ticks.
    pub momentum: f64,
}

impl GeneratorState {
    /// Create the initial state with zero momentum.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, initial_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: initial_price,
            momentum: 0.0,
        }
    }
}

/// Read-only view of a generator, used for progress logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorSnapshot {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Current price rounded to cents.
    pub price: f64,
    /// Momentum expressed as a percentage, rounded to 4 places.
    pub momentum_pct: f64,
}

// =============================================================================
// Trade Generator
// =============================================================================

/// Trade generator for a single instrument.
///
/// Owns its state and entropy source exclusively; run one instance per
/// instrument.
#[derive(Debug)]
pub struct TradeGenerator<R = StdRng> {
    state: GeneratorState,
    rng: R,
}

impl TradeGenerator<StdRng> {
    /// Create a generator seeded from OS entropy.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, initial_price: f64) -> Self {
        Self::with_rng(symbol, initial_price, StdRng::from_os_rng())
    }

    /// Create a reproducible generator from a fixed seed.
    #[must_use]
    pub fn seeded(symbol: impl Into<Symbol>, initial_price: f64, seed: u64) -> Self {
        Self::with_rng(symbol, initial_price, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TradeGenerator<R> {
    /// Create a generator with an explicit entropy source.
    #[must_use]
    pub fn with_rng(symbol: impl Into<Symbol>, initial_price: f64, rng: R) -> Self {
        Self {
            state: GeneratorState::new(symbol, initial_price),
            rng,
        }
    }

    /// Instrument symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.state.symbol
    }

    /// Current walk state.
    #[must_use]
    pub const fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Advance one tick and emit a trade stamped with the current wall clock.
    pub fn generate_trade(&mut self) -> TradeEvent {
        self.generate_trade_at(Utc::now())
    }

    /// Advance one tick and emit a trade stamped with `now`.
    ///
    /// Draw order is fixed: momentum noise, price noise, block-trade coin,
    /// volume multiplier.
    pub fn generate_trade_at(&mut self, now: DateTime<Utc>) -> TradeEvent {
        let draws = self.draw();
        step(&mut self.state, draws, now)
    }

    /// Snapshot of the current state for diagnostics.
    #[must_use]
    pub fn get_current_state(&self) -> GeneratorSnapshot {
        GeneratorSnapshot {
            symbol: self.state.symbol.clone(),
            price: round_to(self.state.current_price, 2),
            momentum_pct: round_to(self.state.momentum * 100.0, 4),
        }
    }

    fn draw(&mut self) -> TickDraws {
        let momentum_z = self.rng.sample(StandardNormal);
        let price_z = self.rng.sample(StandardNormal);
        let (low, high) = if self.rng.random::<f64>() < LARGE_TRADE_PROBABILITY {
            LARGE_TRADE_MULTIPLIER
        } else {
            NORMAL_TRADE_MULTIPLIER
        };
        TickDraws {
            momentum_z,
            price_z,
            volume_multiplier: self.rng.random_range(low..=high),
        }
    }
}

/// Random inputs consumed by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TickDraws {
    /// Standard normal draw scaled into the momentum noise.
    momentum_z: f64,
    /// Standard normal draw scaled into the price change.
    price_z: f64,
    /// Volume multiplier from the block or ordinary range.
    volume_multiplier: f64,
}

/// Apply one tick's draws to `state` and build the resulting trade.
#[allow(clippy::cast_precision_loss)]
fn step(state: &mut GeneratorState, draws: TickDraws, now: DateTime<Utc>) -> TradeEvent {
    state.momentum =
        state.momentum * MOMENTUM_DECAY + MOMENTUM_NOISE.mul_add(draws.momentum_z, 0.0);

    let price_change = VOLATILITY.mul_add(draws.price_z, state.momentum);
    state.current_price = (state.current_price * (1.0 + price_change)).max(PRICE_FLOOR);

    let current = state.current_price;
    let half_spread = current * SPREAD_FRACTION / 2.0;
    let (price, bid, ask) = quote(current, current - half_spread, current + half_spread);

    TradeEvent {
        symbol: state.symbol.clone(),
        timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        price,
        bid,
        ask,
        volume: trade_volume(draws.volume_multiplier),
        generated_at: now.to_rfc3339_opts(SecondsFormat::Micros, true),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn trade_volume(multiplier: f64) -> u64 {
    ((VOLUME_BASE * multiplier).round() as u64).max(1)
}

/// Round a raw quote to cents while keeping `bid < price < ask`.
///
/// Below roughly $50 half the spread is under half a cent and plain
/// rounding collapses the quote; the bid and ask are then held one cent
/// away from the rounded price.
fn quote(price: f64, bid: f64, ask: f64) -> (f64, f64, f64) {
    let price = round_to(price, 2);
    let bid = round_to(bid, 2).min(round_to(price - CENT, 2));
    let ask = round_to(ask, 2).max(round_to(price + CENT, 2));
    (price, bid, ask)
}

#[allow(clippy::cast_possible_wrap)]
fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rand::Rng;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 14, 30, 0).unwrap()
    }

    #[test]
    fn initial_state_has_zero_momentum() {
        let generator = TradeGenerator::seeded("AAPL", 150.0, 7);
        assert_eq!(generator.symbol(), "AAPL");
        assert!((generator.state().current_price - 150.0).abs() < f64::EPSILON);
        assert!(generator.state().momentum.abs() < f64::EPSILON);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = TradeGenerator::seeded("MSFT", 310.0, 42);
        let mut b = TradeGenerator::seeded("MSFT", 310.0, 42);

        for _ in 0..50 {
            assert_eq!(a.generate_trade_at(fixed_now()), b.generate_trade_at(fixed_now()));
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = TradeGenerator::seeded("MSFT", 310.0, 1);
        let mut b = TradeGenerator::seeded("MSFT", 310.0, 2);

        let seq_a: Vec<_> = (0..20).map(|_| a.generate_trade_at(fixed_now())).collect();
        let seq_b: Vec<_> = (0..20).map(|_| b.generate_trade_at(fixed_now())).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn trade_carries_symbol_and_timestamp() {
        let mut generator = TradeGenerator::seeded("GOOGL", 140.0, 3);
        let trade = generator.generate_trade_at(fixed_now());

        assert_eq!(trade.symbol, "GOOGL");
        assert!((trade.timestamp - 1_718_029_800.0).abs() < 1e-6);
        assert_eq!(trade.generated_at, "2024-06-10T14:30:00.000000Z");
    }

    #[test]
    fn price_never_falls_below_floor() {
        let mut generator = TradeGenerator::seeded("PENNY", 1.0, 11);
        for _ in 0..5_000 {
            let trade = generator.generate_trade_at(fixed_now());
            assert!(trade.price >= PRICE_FLOOR);
            assert!(generator.state().current_price >= PRICE_FLOOR);
        }
    }

    #[test]
    fn quote_rounding_keeps_spread_open_at_low_prices() {
        let (price, bid, ask) = quote(10.004, 10.003, 10.005);
        assert!((price - 10.0).abs() < 1e-9);
        assert!((bid - 9.99).abs() < 1e-9);
        assert!((ask - 10.01).abs() < 1e-9);
    }

    #[test]
    fn quote_rounding_preserves_wide_spreads() {
        let (price, bid, ask) = quote(500.0, 499.95, 500.05);
        assert!((price - 500.0).abs() < 1e-9);
        assert!((bid - 499.95).abs() < 1e-9);
        assert!((ask - 500.05).abs() < 1e-9);
    }

    #[test]
    fn snapshot_rounds_price_and_scales_momentum() {
        let mut generator = TradeGenerator::seeded("AAPL", 150.0, 5);
        let _ = generator.generate_trade_at(fixed_now());

        let snapshot = generator.get_current_state();
        let state = generator.state();
        assert_eq!(snapshot.symbol, "AAPL");
        assert!((snapshot.price - round_to(state.current_price, 2)).abs() < 1e-9);
        assert!((snapshot.momentum_pct - round_to(state.momentum * 100.0, 4)).abs() < 1e-9);
    }

    #[test]
    fn snapshot_does_not_mutate_state() {
        let mut generator = TradeGenerator::seeded("AAPL", 150.0, 5);
        let _ = generator.generate_trade_at(fixed_now());
        let before = generator.state().clone();
        let _ = generator.get_current_state();
        assert_eq!(generator.state(), &before);
    }

    fn draws(momentum_z: f64, price_z: f64, volume_multiplier: f64) -> TickDraws {
        TickDraws {
            momentum_z,
            price_z,
            volume_multiplier,
        }
    }

    #[test]
    fn step_produces_exact_quotes() {
        let mut state = GeneratorState::new("AAPL", 150.0);

        let first = step(&mut state, draws(20.0, 0.0, 12.3456), fixed_now());
        assert!((state.momentum - 0.01).abs() < 1e-15);
        assert!((state.current_price - 151.5).abs() < 1e-9);
        assert_eq!(first.price, 151.5);
        assert_eq!(first.bid, 151.48);
        assert_eq!(first.ask, 151.52);
        assert_eq!(first.volume, 12_346);

        let second = step(&mut state, draws(0.0, 0.0, 0.5), fixed_now());
        assert!((state.momentum - 0.0095).abs() < 1e-15);
        assert!((state.current_price - 152.939_25).abs() < 1e-9);
        assert_eq!(second.price, 152.94);
        assert_eq!(second.bid, 152.92);
        assert_eq!(second.ask, 152.95);
        assert_eq!(second.volume, 500);
    }

    #[test]
    fn step_applies_price_noise_around_momentum() {
        let mut state = GeneratorState::new("MSFT", 200.0);
        state.momentum = 0.002;

        let trade = step(&mut state, draws(0.0, -3.0, 1.0), fixed_now());

        // momentum 0.0019, change 0.0019 - 0.003 = -0.0011
        assert!((state.momentum - 0.0019).abs() < 1e-15);
        assert!((state.current_price - 199.78).abs() < 1e-9);
        assert_eq!(trade.price, 199.78);
        assert_eq!(trade.bid, 199.76);
        assert_eq!(trade.ask, 199.8);
        assert_eq!(trade.volume, 1_000);
    }

    #[test]
    fn step_clamps_to_floor() {
        let mut state = GeneratorState::new("PENNY", 2.0);

        let trade = step(&mut state, draws(0.0, -2_000.0, 0.5), fixed_now());

        assert_eq!(state.current_price, PRICE_FLOOR);
        assert_eq!(trade.price, 1.0);
        assert_eq!(trade.bid, 0.99);
        assert_eq!(trade.ask, 1.01);
    }

    #[test]
    fn trade_volume_rounds_to_nearest_share() {
        assert_eq!(trade_volume(0.5), 500);
        assert_eq!(trade_volume(1.2346), 1_235);
        assert_eq!(trade_volume(19.9994), 19_999);
        assert_eq!(trade_volume(0.0), 1);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn seeded_walk_follows_draw_order() {
        let mut generator = TradeGenerator::seeded("AAPL", 150.0, 42);
        let mut rng = StdRng::seed_from_u64(42);
        let mut price = 150.0_f64;
        let mut momentum = 0.0_f64;

        for _ in 0..5 {
            let momentum_z: f64 = rng.sample(StandardNormal);
            let price_z: f64 = rng.sample(StandardNormal);
            let (low, high) = if rng.random::<f64>() < 0.05 {
                (5.0, 20.0)
            } else {
                (0.5, 2.0)
            };
            let multiplier: f64 = rng.random_range(low..=high);

            momentum = momentum * 0.95 + 0.0005_f64.mul_add(momentum_z, 0.0);
            price = (price * (1.0 + 0.001_f64.mul_add(price_z, momentum))).max(1.0);

            let trade = generator.generate_trade_at(fixed_now());
            assert_eq!(generator.state().momentum.to_bits(), momentum.to_bits());
            assert_eq!(generator.state().current_price.to_bits(), price.to_bits());
            assert_eq!(trade.price, (price * 100.0).round() / 100.0);
            assert_eq!(trade.volume, (1000.0 * multiplier).round() as u64);
        }
    }

    proptest! {
        #[test]
        fn trades_are_well_formed(seed in any::<u64>(), initial in 1.0f64..5_000.0, ticks in 1usize..200) {
            let mut generator = TradeGenerator::seeded("PROP", initial, seed);
            for _ in 0..ticks {
                let trade = generator.generate_trade_at(fixed_now());
                prop_assert!(trade.price > 0.0);
                prop_assert!(trade.bid < trade.price, "bid {} !< price {}", trade.bid, trade.price);
                prop_assert!(trade.price < trade.ask, "price {} !< ask {}", trade.price, trade.ask);
                prop_assert!(trade.volume >= 1);
                prop_assert!(trade.volume >= 500 && trade.volume <= 20_000);
            }
        }
    }
}
