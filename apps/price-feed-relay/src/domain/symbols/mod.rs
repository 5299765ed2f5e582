//! Tracked Symbol Set
//!
//! The ordered, fixed list of instruments relayed by the service. The order
//! established at startup defines both the feed subscription topics and the
//! field order of the published record schema, so it never changes while the
//! process runs.

use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Symbol
// =============================================================================

/// A tracked instrument identifier (base asset, e.g. `BTC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Parse a symbol, normalising it to upper case.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty or contains characters other
    /// than ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SymbolError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tracked Symbols
// =============================================================================

/// Ordered, duplicate-free set of tracked symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSymbols {
    symbols: Vec<Symbol>,
    index: HashMap<Symbol, usize>,
}

impl TrackedSymbols {
    /// Build the set from raw symbol strings, preserving order.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, a symbol is invalid, or a
    /// symbol appears twice.
    pub fn new<I, S>(raw: I) -> Result<Self, SymbolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols = Vec::new();
        let mut index = HashMap::new();

        for item in raw {
            let symbol = Symbol::parse(item.as_ref())?;
            if index.contains_key(&symbol) {
                return Err(SymbolError::Duplicate(symbol.0));
            }
            index.insert(symbol.clone(), symbols.len());
            symbols.push(symbol);
        }

        if symbols.is_empty() {
            return Err(SymbolError::NoSymbols);
        }

        Ok(Self { symbols, index })
    }

    /// Position of a symbol in schema order, if tracked.
    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<usize> {
        // Symbols are stored upper case; most lookups already are.
        Symbol::parse(symbol)
            .ok()
            .and_then(|s| self.index.get(&s).copied())
    }

    /// Whether the symbol is tracked.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.position(symbol).is_some()
    }

    /// Iterate symbols in schema order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Symbols in schema order.
    #[must_use]
    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; an empty set cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Trade channel names for every symbol, e.g. `btcusdt@trade`.
    #[must_use]
    pub fn trade_streams(&self, quote_asset: &str) -> Vec<String> {
        let quote = quote_asset.to_ascii_lowercase();
        self.symbols
            .iter()
            .map(|s| format!("{}{quote}@trade", s.as_str().to_ascii_lowercase()))
            .collect()
    }
}

/// Errors raised while building the tracked symbol set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// An empty symbol string.
    #[error("symbol cannot be empty")]
    Empty,
    /// A symbol with characters outside `[A-Za-z0-9]`.
    #[error("symbol {0:?} contains invalid characters")]
    InvalidCharacters(String),
    /// A symbol listed more than once.
    #[error("symbol {0} is listed more than once")]
    Duplicate(String),
    /// The list contained no symbols.
    #[error("at least one symbol must be tracked")]
    NoSymbols,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_and_normalises_case() {
        let symbols = TrackedSymbols::new(["btc", "ETH", " sol "]).unwrap();
        let names: Vec<_> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(symbols.position("ETH"), Some(1));
        assert_eq!(symbols.position("eth"), Some(1));
        assert_eq!(symbols.position("DOGE"), None);
    }

    #[test]
    fn rejects_duplicates() {
        let err = TrackedSymbols::new(["BTC", "btc"]).unwrap_err();
        assert_eq!(err, SymbolError::Duplicate("BTC".to_string()));
    }

    #[test]
    fn rejects_empty_list() {
        let err = TrackedSymbols::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, SymbolError::NoSymbols);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(
            TrackedSymbols::new(["BTC-USD"]),
            Err(SymbolError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn trade_streams_are_lowercase_with_quote_suffix() {
        let symbols = TrackedSymbols::new(["BTC", "PEPE"]).unwrap();
        assert_eq!(
            symbols.trade_streams("USDT"),
            vec!["btcusdt@trade", "pepeusdt@trade"]
        );
    }
}
