//! Configuration Module
//!
//! Configuration loading for the trade feed service.

mod settings;

pub use settings::{
    ConfigError, FeedConfig, ProducerSettings, ServerSettings, StoreSettings, StreamSettings,
    SubscriberSettings, Ticker, TickerMode,
};
