//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay services (ingest, registration, publishing)
//! and the port interfaces they use to reach the feed and the ledger.

/// Port interfaces for external systems (feed events, ledger).
pub mod ports;

/// Application services for ingesting prices and publishing records.
pub mod services;
