//! Relay Context
//!
//! The process-wide state shared by the feed, ingest and publish tasks:
//! tracked symbols, the schema derived from them, the price cache, feed
//! status and the root cancellation token. Tasks receive `Arc`s and child
//! tokens from here; [`RelayContext::shutdown`] stops all of them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{NoopMetrics, RelayMetrics};
use crate::application::services::FeedState;
use crate::domain::prices::PriceCache;
use crate::domain::schema::{FieldSchema, SchemaId};
use crate::domain::symbols::TrackedSymbols;

/// Shared relay state.
#[derive(Debug, Clone)]
pub struct RelayContext {
    symbols: Arc<TrackedSymbols>,
    schema: Arc<FieldSchema>,
    schema_id: SchemaId,
    cache: Arc<PriceCache>,
    feed_state: Arc<FeedState>,
    metrics: Arc<dyn RelayMetrics>,
    cancel: CancellationToken,
}

impl RelayContext {
    /// Build the context for a symbol set.
    ///
    /// The schema (and its id) is fixed here for the lifetime of the process.
    #[must_use]
    pub fn new(symbols: TrackedSymbols) -> Self {
        Self::with_metrics(symbols, Arc::new(NoopMetrics))
    }

    /// Build the context with a metrics sink shared by every task.
    #[must_use]
    pub fn with_metrics(symbols: TrackedSymbols, metrics: Arc<dyn RelayMetrics>) -> Self {
        let symbols = Arc::new(symbols);
        let schema = Arc::new(FieldSchema::for_symbols(&symbols));
        let schema_id = schema.id();
        Self {
            cache: Arc::new(PriceCache::new(Arc::clone(&symbols))),
            symbols,
            schema,
            schema_id,
            feed_state: Arc::new(FeedState::with_metrics(Arc::clone(&metrics))),
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    /// Tracked symbols, in schema order.
    #[must_use]
    pub fn symbols(&self) -> Arc<TrackedSymbols> {
        Arc::clone(&self.symbols)
    }

    /// Record schema.
    #[must_use]
    pub fn schema(&self) -> Arc<FieldSchema> {
        Arc::clone(&self.schema)
    }

    /// Identifier of the record schema.
    #[must_use]
    pub const fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Latest-price cache.
    #[must_use]
    pub fn cache(&self) -> Arc<PriceCache> {
        Arc::clone(&self.cache)
    }

    /// Feed connection status.
    #[must_use]
    pub fn feed_state(&self) -> Arc<FeedState> {
        Arc::clone(&self.feed_state)
    }

    /// Metrics sink for the services.
    #[must_use]
    pub fn metrics(&self) -> Arc<dyn RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Token for a task; cancelled on shutdown.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Stop every task holding a token from this context.
    pub fn shutdown(&self) {
        tracing::info!("Relay shutting down");
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
