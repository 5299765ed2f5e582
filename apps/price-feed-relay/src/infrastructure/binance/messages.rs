//! Binance combined-stream message types.
//!
//! Combined streams wrap every payload in an envelope:
//!
//! ```json
//! {"stream":"btcusdt@trade","data":{"e":"trade","E":1700000000000,"s":"BTCUSDT","t":1,"p":"50000.12","q":"0.01","T":1700000000000}}
//! ```
//!
//! Only the fields the relay reads are modelled; serde skips the rest.

use serde::Deserialize;

/// Envelope around every combined-stream payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    /// Event payload. Absent on subscription control responses.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Raw trade event.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    /// Event time in milliseconds.
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    /// Instrument, e.g. `BTCUSDT`.
    #[serde(rename = "s")]
    pub instrument: String,
    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,
    /// Trade time in milliseconds.
    #[serde(rename = "T", default)]
    pub trade_time: Option<u64>,
}

/// Event type carried by trade payloads.
pub const TRADE_EVENT: &str = "trade";
