//! Port Interfaces
//!
//! Contracts between the relay services and the outside world, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driver Ports (Inbound)
//!
//! - `FeedEvent`: events emitted by a market-data feed adapter
//!
//! ## Driven Ports (Outbound)
//!
//! - `LedgerPort`: schema registration, record submission, receipt waits
//! - `RelayMetrics`: counters and timings reported by the services

mod feed;
mod ledger;
mod metrics;

pub use feed::{FeedEvent, TradeTick};
pub use ledger::{
    LedgerError, LedgerErrorKind, LedgerPort, Receipt, RecordSubmission, SchemaRegistration,
    TxHash,
};
pub use metrics::{NoopMetrics, RelayMetrics};

#[cfg(test)]
pub use ledger::MockLedgerPort;
