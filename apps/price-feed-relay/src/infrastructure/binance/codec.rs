//! Trade Stream Codec
//!
//! Decodes Binance combined-stream text frames into [`TradeTick`]s for the
//! tracked symbol set. Non-trade payloads decode to `None`; anything that
//! claims to be a trade but cannot be used is a [`CodecError`].

use std::sync::Arc;

use super::messages::{StreamEnvelope, TRADE_EVENT, TradeEvent};
use crate::application::ports::TradeTick;
use crate::domain::symbols::{Symbol, TrackedSymbols};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON parsing failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope without a `data` object.
    #[error("message has no data object")]
    MissingData,

    /// Instrument without the expected quote suffix.
    #[error("instrument {0} is not quoted in {1}")]
    UnexpectedQuote(String, String),

    /// Instrument whose base asset is not tracked.
    #[error("instrument {0} is not tracked")]
    UntrackedSymbol(String),

    /// Price string that is not a finite, non-negative number.
    #[error("invalid price {0:?}")]
    InvalidPrice(String),
}

impl CodecError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed_json",
            Self::MissingData => "missing_data",
            Self::UnexpectedQuote(..) => "unexpected_quote",
            Self::UntrackedSymbol(_) => "untracked_symbol",
            Self::InvalidPrice(_) => "invalid_price",
        }
    }
}

/// JSON codec for the trade stream.
#[derive(Debug, Clone)]
pub struct TradeCodec {
    symbols: Arc<TrackedSymbols>,
    quote_asset: String,
}

impl TradeCodec {
    /// Create a codec for the tracked symbols quoted in `quote_asset`.
    #[must_use]
    pub fn new(symbols: Arc<TrackedSymbols>, quote_asset: &str) -> Self {
        Self {
            symbols,
            quote_asset: quote_asset.to_ascii_uppercase(),
        }
    }

    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for well-formed messages that are not trades.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, envelopes without data, and
    /// trades for unknown instruments or with unusable prices.
    pub fn decode(&self, text: &str) -> Result<Option<TradeTick>, CodecError> {
        let envelope: StreamEnvelope = serde_json::from_str(text)?;
        let data = envelope.data.ok_or(CodecError::MissingData)?;

        if data.get("e").and_then(|v| v.as_str()) != Some(TRADE_EVENT) {
            return Ok(None);
        }

        let trade: TradeEvent = serde_json::from_value(data)?;
        let base = trade
            .instrument
            .to_ascii_uppercase()
            .strip_suffix(&self.quote_asset)
            .map(str::to_string)
            .ok_or_else(|| {
                CodecError::UnexpectedQuote(trade.instrument.clone(), self.quote_asset.clone())
            })?;

        if !self.symbols.contains(&base) {
            return Err(CodecError::UntrackedSymbol(trade.instrument));
        }
        let symbol =
            Symbol::parse(&base).map_err(|_| CodecError::UntrackedSymbol(trade.instrument.clone()))?;

        let price: f64 = trade
            .price
            .trim()
            .parse()
            .map_err(|_| CodecError::InvalidPrice(trade.price.clone()))?;
        if !price.is_finite() || price < 0.0 {
            return Err(CodecError::InvalidPrice(trade.price));
        }

        Ok(Some(TradeTick {
            symbol,
            price,
            trade_time_ms: trade.trade_time.or(trade.event_time),
        }))
    }
}
