#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Price Feed Relay - Exchange Trades to Ledger Records
//!
//! Maintains one WebSocket connection to Binance's combined trade stream for
//! a fixed set of symbols, keeps the latest trade price per symbol, and on a
//! fixed period publishes the whole price set as one schema-encoded record
//! to the ledger.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure relay types and logic
//!   - `symbols`: Tracked symbol set
//!   - `prices`: Latest-price cache and snapshots
//!   - `schema`: Record field schema and schema identifiers
//!   - `record`: Record identifiers and the binary payload encoding
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed events and the ledger port
//!   - `services`: Ingest, schema registration, publish scheduling
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Trade stream WebSocket client
//!   - `ledger`: JSON-RPC and in-memory ledger adapters
//!   - `config`: Environment configuration
//!   - `health`: HTTP health and metrics listener
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──► FeedClient ──mpsc──► ingest ──► PriceCache
//!                                                    │ snapshot
//!                                                    ▼
//!                      Ledger ◄── submit ◄── PublishScheduler (every 5s)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Process-wide relay context.
pub mod context;

// =============================================================================
// Re-exports
// =============================================================================

pub use context::RelayContext;

// Domain types
pub use domain::prices::{PriceCache, PriceSnapshot};
pub use domain::record::{Record, RecordId, Word, decode, encode, to_fixed_point};
pub use domain::schema::{FieldSchema, SchemaId};
pub use domain::symbols::{Symbol, TrackedSymbols};

// Ports
pub use application::ports::{
    FeedEvent, LedgerError, LedgerErrorKind, LedgerPort, NoopMetrics, Receipt, RecordSubmission,
    RelayMetrics, SchemaRegistration, TradeTick, TxHash,
};

// Services
pub use application::services::{
    Clock, FeedState, ManualClock, PublishCycleOutcome, PublishError, PublishScheduler,
    PublishStats, SchedulerConfig, SchemaRegistrar, SystemClock, run_ingest,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig, SigningKey};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Ledger adapters
pub use infrastructure::ledger::{InMemoryLedger, JsonRpcLedger};

// Metrics
pub use infrastructure::metrics::{PrometheusMetrics, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
