//! Ledger collaborator port.
//!
//! The ledger client (signing, broadcast, receipt polling) lives outside the
//! relay core. The core only needs to register a schema, submit records and
//! wait for the resulting transaction to be confirmed.

use std::fmt;

use async_trait::async_trait;

use crate::domain::record::{Record, RecordId};
use crate::domain::schema::SchemaId;

/// Transaction hash returned by a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Confirmed transaction.
    pub tx_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Whether execution succeeded.
    pub success: bool,
}

/// A schema registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistration {
    /// Human-readable schema name.
    pub name: String,
    /// Canonical schema text.
    pub schema: String,
    /// Parent schema ([`SchemaId::ZERO`] for none).
    pub parent: SchemaId,
}

/// A record as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSubmission {
    /// Record id.
    pub id: RecordId,
    /// Schema id.
    pub schema_id: SchemaId,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl From<&Record> for RecordSubmission {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            schema_id: record.schema_id,
            payload: record.payload.clone(),
        }
    }
}

/// Classification of ledger failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    /// The schema already exists on the ledger.
    AlreadyRegistered,
    /// The endpoint could not be reached.
    Transport,
    /// The endpoint rejected the request.
    Rejected,
    /// The response could not be understood.
    InvalidResponse,
    /// No confirmation arrived in time.
    Timeout,
}

impl LedgerErrorKind {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered => "already_registered",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::InvalidResponse => "invalid_response",
            Self::Timeout => "timeout",
        }
    }
}

/// Error returned by a ledger adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ledger {}: {message}", .kind.as_str())]
pub struct LedgerError {
    /// Failure class.
    pub kind: LedgerErrorKind,
    /// Adapter-provided detail.
    pub message: String,
}

impl LedgerError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error means the schema is already registered.
    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        self.kind == LedgerErrorKind::AlreadyRegistered
    }
}

/// Narrow interface to the ledger network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Submit a schema registration; returns the transaction hash.
    async fn register_schema(&self, registration: &SchemaRegistration)
    -> Result<TxHash, LedgerError>;

    /// Submit records; returns the transaction hash.
    async fn submit_records(&self, records: &[RecordSubmission]) -> Result<TxHash, LedgerError>;

    /// Wait until the transaction is confirmed.
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError>;
}
