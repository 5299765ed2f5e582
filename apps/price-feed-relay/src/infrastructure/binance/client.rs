//! Trade Stream Client
//!
//! Maintains one combined-stream WebSocket connection covering the trade
//! channel of every tracked symbol and forwards decoded trades as
//! [`FeedEvent`]s.
//!
//! # Stream URL
//!
//! `wss://data-stream.binance.vision/stream?streams=btcusdt@trade/ethusdt@trade/...`
//!
//! # Connection Lifecycle
//!
//! - Pings from the server are answered with a pong carrying the same payload.
//! - A close frame, a socket error, the end of the stream or a read idle
//!   timeout all take the same path: a single reconnect is scheduled on the
//!   [`ReconnectTimer`] and a fresh connection is opened once it fires.
//! - Malformed or unrecognised messages are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::TradeCodec;
use super::reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectTick, ReconnectTimer};
use crate::application::ports::FeedEvent;
use crate::domain::symbols::TrackedSymbols;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a single feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// No frame arrived within the idle timeout.
    #[error("no message received for {0:?}")]
    IdleTimeout(Duration),

    /// The event consumer went away.
    #[error("feed event channel closed")]
    ChannelClosed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Default combined-stream endpoint.
pub const DEFAULT_STREAM_BASE_URL: &str = "wss://data-stream.binance.vision/stream";

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Full subscription URL.
    pub url: String,
    /// Quote asset stripped from instrument names.
    pub quote_asset: String,
    /// Delay before reconnecting after a disconnect.
    pub reconnect_delay: Duration,
    /// Read idle timeout; `None` disables it.
    pub idle_timeout: Option<Duration>,
}

impl FeedClientConfig {
    /// Build the configuration for `symbols` against `base_url`.
    #[must_use]
    pub fn new(base_url: &str, symbols: &TrackedSymbols, quote_asset: &str) -> Self {
        Self {
            url: stream_url(base_url, symbols, quote_asset),
            quote_asset: quote_asset.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Combined-stream URL subscribing to every tracked symbol's trade channel.
#[must_use]
pub fn stream_url(base_url: &str, symbols: &TrackedSymbols, quote_asset: &str) -> String {
    format!(
        "{}?streams={}",
        base_url.trim_end_matches('/'),
        symbols.trade_streams(quote_asset).join("/")
    )
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket client for the trade stream.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: TradeCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    reconnect: ReconnectTimer,
    reconnect_rx: Mutex<mpsc::Receiver<ReconnectTick>>,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        symbols: Arc<TrackedSymbols>,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let codec = TradeCodec::new(symbols, &config.quote_asset);
        let (reconnect, reconnect_rx) =
            ReconnectTimer::new(config.reconnect_delay, cancel.child_token());
        Self {
            config,
            codec,
            event_tx,
            cancel,
            reconnect,
            reconnect_rx: Mutex::new(reconnect_rx),
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// Connection failures never end the loop; they schedule a reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error only if the event consumer has gone away.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut reconnect_rx = self.reconnect_rx.lock().await;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                return Ok(());
            }

            match self.connect_and_run().await {
                Ok(()) => {
                    tracing::info!("Feed client stopped");
                    return Ok(());
                }
                Err(FeedClientError::ChannelClosed) => return Err(FeedClientError::ChannelClosed),
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection lost");
                    self.emit(FeedEvent::Disconnected).await?;
                    self.on_disconnect();
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Feed client cancelled during reconnect delay");
                    return Ok(());
                }
                tick = reconnect_rx.recv() => {
                    let Some(tick) = tick else {
                        return Ok(());
                    };
                    metrics::record_reconnect();
                    tracing::info!(attempt = tick.attempt, "Reconnecting to trade stream");
                    self.emit(FeedEvent::Reconnecting { attempt: tick.attempt }).await?;
                }
            }
        }
    }

    /// Handle a lost connection (close or error): schedule a single reconnect.
    ///
    /// Returns whether a new reconnect was scheduled.
    pub fn on_disconnect(&self) -> bool {
        let scheduled = self.reconnect.schedule();
        if scheduled {
            tracing::info!(
                delay_ms = self.reconnect.delay().as_millis(),
                "Reconnect scheduled"
            );
        } else {
            tracing::debug!("Reconnect already pending");
        }
        scheduled
    }

    /// Decode one text frame into the event to forward.
    ///
    /// Unusable frames become [`FeedEvent::Dropped`]; non-trade events yield
    /// nothing.
    pub fn on_message(&self, raw: &str) -> Option<FeedEvent> {
        metrics::record_message_received();
        match self.codec.decode(raw) {
            Ok(tick) => tick.map(FeedEvent::Trade),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping feed message");
                Some(FeedEvent::Dropped {
                    reason: e.label().to_string(),
                })
            }
        }
    }

    /// Open one connection and pump frames until it ends.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn connect_and_run(&self) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to trade stream");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(&self.config.url) => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        tracing::info!("Connected to trade stream");
        self.emit(FeedEvent::Connected).await?;

        loop {
            let next = async {
                match self.config.idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, read.next())
                        .await
                        .map_err(|_| FeedClientError::IdleTimeout(limit)),
                    None => Ok(read.next().await),
                }
            };

            let msg = tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = next => msg?,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = self.on_message(&text) {
                        self.emit(event).await?;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(frame = ?frame, "Server sent close frame");
                    return Err(FeedClientError::ConnectionClosed);
                }
                Some(Ok(_)) => {
                    // Binary and pong frames carry nothing for us
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    tracing::info!("WebSocket stream ended");
                    return Err(FeedClientError::ConnectionClosed);
                }
            }
        }
    }

    async fn emit(&self, event: FeedEvent) -> Result<(), FeedClientError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| FeedClientError::ChannelClosed)
    }
}
