//! Binance Trade Stream Adapter
//!
//! Implements the market-data feed on top of Binance's public combined
//! WebSocket streams (JSON codec, one `<symbol><quote>@trade` channel per
//! tracked symbol).

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;

pub use client::{
    DEFAULT_STREAM_BASE_URL, FeedClient, FeedClientConfig, FeedClientError, stream_url,
};
pub use codec::{CodecError, TradeCodec};
pub use messages::{StreamEnvelope, TradeEvent};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectTick, ReconnectTimer};
