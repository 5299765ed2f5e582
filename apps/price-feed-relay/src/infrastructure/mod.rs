//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Binance trade stream client.
pub mod binance;

/// Ledger collaborator adapters (JSON-RPC, in-memory).
pub mod ledger;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP listener.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
