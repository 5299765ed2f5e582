//! Feed Ingest
//!
//! Consumes feed events and applies trades to the price cache. This task is
//! the only writer of the cache; it also keeps the connection status that the
//! health endpoint reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedEvent, NoopMetrics, RelayMetrics};
use crate::domain::prices::PriceCache;

/// Connection status of the feed, shared with the health endpoint.
#[derive(Debug)]
pub struct FeedState {
    connected: AtomicBool,
    trades_applied: AtomicU64,
    messages_dropped: AtomicU64,
    reconnect_attempts: AtomicU32,
    last_trade_time_ms: AtomicU64,
    metrics: Arc<dyn RelayMetrics>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::with_metrics(Arc::new(NoopMetrics))
    }
}

impl FeedState {
    /// Create a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a disconnected state reporting to `metrics`.
    #[must_use]
    pub fn with_metrics(metrics: Arc<dyn RelayMetrics>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            trades_applied: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            last_trade_time_ms: AtomicU64::new(0),
            metrics,
        }
    }

    /// Whether the feed is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Trades written to the cache.
    #[must_use]
    pub fn trades_applied(&self) -> u64 {
        self.trades_applied.load(Ordering::Relaxed)
    }

    /// Messages dropped without effect.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Reconnect attempts since startup.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Exchange time of the newest applied trade, in Unix milliseconds.
    #[must_use]
    pub fn last_trade_time_ms(&self) -> Option<u64> {
        match self.last_trade_time_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        self.metrics.feed_connected(connected);
    }

    fn dropped(&self, reason: &str) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.message_dropped(reason);
    }
}

/// Apply one feed event to the cache and feed state.
pub fn apply_event(event: FeedEvent, cache: &PriceCache, state: &FeedState) {
    match event {
        FeedEvent::Connected => {
            state.set_connected(true);
            tracing::info!("Price feed connected");
        }
        FeedEvent::Disconnected => {
            state.set_connected(false);
            tracing::warn!("Price feed disconnected");
        }
        FeedEvent::Reconnecting { attempt } => {
            state.reconnect_attempts.store(attempt, Ordering::Relaxed);
            tracing::info!(attempt, "Price feed reconnecting");
        }
        FeedEvent::Trade(tick) => {
            if cache.set(tick.symbol.as_str(), tick.price) {
                state.trades_applied.fetch_add(1, Ordering::Relaxed);
                if let Some(ms) = tick.trade_time_ms {
                    state.last_trade_time_ms.fetch_max(ms, Ordering::Relaxed);
                }
                state.metrics.trade_applied();
                tracing::trace!(
                    symbol = %tick.symbol,
                    price = tick.price,
                    trade_time_ms = tick.trade_time_ms,
                    "Price updated"
                );
            } else {
                state.dropped("rejected_price");
                tracing::debug!(symbol = %tick.symbol, price = tick.price, "Trade rejected by cache");
            }
        }
        FeedEvent::Dropped { reason } => {
            state.dropped(&reason);
            tracing::debug!(reason = %reason, "Feed message dropped");
        }
    }
}

/// Drain feed events into the cache until the channel closes or `cancel` fires.
pub async fn run_ingest(
    mut rx: mpsc::Receiver<FeedEvent>,
    cache: Arc<PriceCache>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Feed ingest cancelled");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::debug!("Feed event channel closed");
                    break;
                };
                apply_event(event, &cache, &state);
            }
        }
    }
}
