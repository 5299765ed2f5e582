//! Feed events.

use crate::domain::symbols::Symbol;

/// A trade observed on the feed for a tracked symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    /// Tracked symbol (quote suffix already stripped).
    pub symbol: Symbol,
    /// Traded price.
    pub price: f64,
    /// Exchange trade time in milliseconds, when provided.
    pub trade_time_ms: Option<u64>,
}

/// Events emitted by a feed adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Stream connection established.
    Connected,
    /// Stream connection lost.
    Disconnected,
    /// A scheduled reconnect fired and a new connection is being opened.
    Reconnecting {
        /// Reconnect attempt number since startup.
        attempt: u32,
    },
    /// A trade for a tracked symbol.
    Trade(TradeTick),
    /// A message that could not be used was dropped.
    Dropped {
        /// Why the message was dropped.
        reason: String,
    },
}
