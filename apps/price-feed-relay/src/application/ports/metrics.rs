//! Relay metrics sink.

use std::fmt;
use std::time::Duration;

/// Observations the services report while they run.
///
/// Every method defaults to a no-op so adapters only implement what they
/// export.
pub trait RelayMetrics: Send + Sync + fmt::Debug {
    /// Feed connection state changed.
    fn feed_connected(&self, _connected: bool) {}

    /// A trade was written into the price cache.
    fn trade_applied(&self) {}

    /// A feed message was dropped without effect.
    fn message_dropped(&self, _reason: &str) {}

    /// A publish cycle finished with `outcome` after `elapsed`.
    fn publish_cycle(&self, _outcome: &str, _elapsed: Duration) {}

    /// A schema registration attempt finished with `outcome`.
    fn schema_registration(&self, _outcome: &str) {}
}

/// Metrics sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl RelayMetrics for NoopMetrics {}
