//! Domain Layer - Core relay types and pure logic.
//!
//! Nothing in this layer performs I/O: symbol sets, the price cache, the
//! record schema and the deterministic record encoding.

/// Tracked symbol set.
pub mod symbols;

/// Latest-price cache.
pub mod prices;

/// Record field schema and schema identifiers.
pub mod schema;

/// Record identifiers and the binary record encoding.
pub mod record;
