//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_SCHEMA_NAME, DEFAULT_SYMBOLS, FeedSettings, LedgerSettings, RelayConfig,
    SigningKey,
};
