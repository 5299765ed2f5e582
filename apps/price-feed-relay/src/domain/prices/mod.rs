//! Price Cache
//!
//! Process-wide mapping from tracked symbol to its last observed trade price.
//! Every tracked symbol has an entry from construction onwards (initially
//! zero), so a snapshot never misses a key even before the first trade for a
//! symbol arrives.
//!
//! Writes come from the feed ingest task only; the publish scheduler reads
//! point-in-time snapshots.

use std::sync::Arc;

use parking_lot::RwLock;

use super::symbols::{Symbol, TrackedSymbols};

/// Latest-price cache for the tracked symbol set.
#[derive(Debug)]
pub struct PriceCache {
    symbols: Arc<TrackedSymbols>,
    prices: RwLock<Vec<f64>>,
}

impl PriceCache {
    /// Create a cache with a zero entry for every tracked symbol.
    #[must_use]
    pub fn new(symbols: Arc<TrackedSymbols>) -> Self {
        let prices = vec![0.0; symbols.len()];
        Self {
            symbols,
            prices: RwLock::new(prices),
        }
    }

    /// Last known price for `symbol`, or `0.0` if never set or untracked.
    #[must_use]
    pub fn get(&self, symbol: &str) -> f64 {
        self.symbols
            .position(symbol)
            .map_or(0.0, |idx| self.prices.read()[idx])
    }

    /// Store the latest price for `symbol`.
    ///
    /// Returns `false` (and leaves the cache untouched) when the symbol is not
    /// tracked or the price is negative or not finite.
    pub fn set(&self, symbol: &str, price: f64) -> bool {
        if !price.is_finite() || price < 0.0 {
            return false;
        }
        let Some(idx) = self.symbols.position(symbol) else {
            return false;
        };
        self.prices.write()[idx] = price;
        true
    }

    /// Point-in-time copy of all prices in schema order.
    #[must_use]
    pub fn snapshot(&self) -> PriceSnapshot {
        let prices = self.prices.read().clone();
        let entries = self
            .symbols
            .iter()
            .cloned()
            .zip(prices)
            .collect();
        PriceSnapshot { entries }
    }

    /// The tracked symbol set backing this cache.
    #[must_use]
    pub fn symbols(&self) -> &Arc<TrackedSymbols> {
        &self.symbols
    }
}

/// Ordered `(symbol, price)` pairs captured at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    entries: Vec<(Symbol, f64)>,
}

impl PriceSnapshot {
    /// Build a snapshot directly from ordered entries.
    #[must_use]
    pub const fn from_entries(entries: Vec<(Symbol, f64)>) -> Self {
        Self { entries }
    }

    /// Entries in schema order.
    #[must_use]
    pub fn entries(&self) -> &[(Symbol, f64)] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
