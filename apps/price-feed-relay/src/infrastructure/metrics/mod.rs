//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feed**: messages received, dropped, trades applied, reconnects and
//!   connection state
//! - **Publishing**: publish cycles by outcome and their duration
//! - **Registration**: schema registration attempts by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op. Services report through
//! [`PrometheusMetrics`], their [`RelayMetrics`] sink.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::RelayMetrics;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again returns the existing handle.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "price_relay_messages_received_total",
        "Total messages received from the trade stream"
    );
    describe_counter!(
        "price_relay_messages_dropped_total",
        "Total trade stream messages dropped by reason"
    );
    describe_counter!(
        "price_relay_trades_applied_total",
        "Total trades applied to the price cache"
    );
    describe_counter!(
        "price_relay_reconnects_total",
        "Total trade stream reconnection attempts"
    );
    describe_gauge!(
        "price_relay_feed_connected",
        "Whether the trade stream is connected (1) or not (0)"
    );

    // Publishing
    describe_counter!(
        "price_relay_publish_cycles_total",
        "Total publish cycles by outcome"
    );
    describe_histogram!(
        "price_relay_publish_cycle_seconds",
        "Time from snapshot to confirmed receipt or failure"
    );

    // Registration
    describe_counter!(
        "price_relay_schema_registrations_total",
        "Total schema registration attempts by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a message received from the trade stream.
pub fn record_message_received() {
    counter!("price_relay_messages_received_total").increment(1);
}

/// Record a dropped message.
pub fn record_message_dropped(reason: &str) {
    counter!(
        "price_relay_messages_dropped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a trade written into the price cache.
pub fn record_trade_applied() {
    counter!("price_relay_trades_applied_total").increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("price_relay_reconnects_total").increment(1);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("price_relay_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a finished publish cycle.
pub fn record_publish_cycle(outcome: &str, duration: Duration) {
    counter!(
        "price_relay_publish_cycles_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "price_relay_publish_cycle_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a schema registration attempt.
pub fn record_registration(outcome: &str) {
    counter!(
        "price_relay_schema_registrations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// =============================================================================
// Service Sink
// =============================================================================

/// [`RelayMetrics`] sink backed by the global Prometheus recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl RelayMetrics for PrometheusMetrics {
    fn feed_connected(&self, connected: bool) {
        set_feed_connected(connected);
    }

    fn trade_applied(&self) {
        record_trade_applied();
    }

    fn message_dropped(&self, reason: &str) {
        record_message_dropped(reason);
    }

    fn publish_cycle(&self, outcome: &str, elapsed: Duration) {
        record_publish_cycle(outcome, elapsed);
    }

    fn schema_registration(&self, outcome: &str) {
        record_registration(outcome);
    }
}

// =============================================================================
// Tests
// =============================================================================
