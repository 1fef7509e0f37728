//! Domain Layer - Trade types, generation and coalescing.
//!
//! Pure logic with no I/O. Everything here is deterministic given its
//! inputs (the generator given its entropy source).

/// Trade event and subscriber envelope types.
pub mod trade;

/// Per-instrument stochastic trade generator.
pub mod generator;

/// Last-write-wins reduction of a batch to one trade per symbol.
pub mod coalesce;
