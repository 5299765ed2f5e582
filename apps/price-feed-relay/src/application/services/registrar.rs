//! Schema Registrar
//!
//! Makes sure the record schema is known to the ledger before records are
//! published against it. Registration is best-effort and idempotent from the
//! caller's point of view: an "already registered" answer counts as success,
//! and genuine failures are logged and retried on the next publish cycle
//! without ever stopping the relay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::application::ports::{
    LedgerError, LedgerPort, NoopMetrics, Receipt, RelayMetrics, SchemaRegistration,
};
use crate::domain::schema::{FieldSchema, SchemaId};

/// Result of a registration attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The schema was registered by this call.
    Registered(Receipt),
    /// The schema was already known to the ledger.
    AlreadyRegistered,
}

/// Registration failures other than "already registered".
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The ledger refused or could not process the request.
    #[error("schema registration failed: {0}")]
    Ledger(#[from] LedgerError),
    /// The registration transaction was mined but reverted.
    #[error("schema registration transaction {0} reverted")]
    Reverted(String),
    /// No receipt arrived in time.
    #[error("schema registration receipt not received within {0:?}")]
    ReceiptTimeout(Duration),
}

/// Registers the record schema with the ledger.
pub struct SchemaRegistrar {
    ledger: Arc<dyn LedgerPort>,
    registration: SchemaRegistration,
    schema_id: SchemaId,
    receipt_timeout: Duration,
    registered: AtomicBool,
    metrics: Arc<dyn RelayMetrics>,
}

impl SchemaRegistrar {
    /// Create a registrar for `schema` under the given human-readable name.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        schema: &FieldSchema,
        name: impl Into<String>,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            registration: SchemaRegistration {
                name: name.into(),
                schema: schema.text(),
                parent: SchemaId::ZERO,
            },
            schema_id: schema.id(),
            receipt_timeout,
            registered: AtomicBool::new(false),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report registration outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Identifier of the registered schema.
    #[must_use]
    pub const fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Whether a registration has been confirmed (or found to exist).
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Submit a registration request and wait for it to be confirmed.
    ///
    /// "Already registered" is reported as [`RegistrationOutcome::AlreadyRegistered`],
    /// never as an error.
    ///
    /// # Errors
    ///
    /// Returns an error for genuine ledger failures, reverted transactions
    /// and receipt timeouts.
    pub async fn register_if_needed(&self) -> Result<RegistrationOutcome, RegistrationError> {
        let tx_hash = match self.ledger.register_schema(&self.registration).await {
            Ok(hash) => hash,
            Err(e) if e.is_already_registered() => {
                self.registered.store(true, Ordering::Release);
                return Ok(RegistrationOutcome::AlreadyRegistered);
            }
            Err(e) => return Err(e.into()),
        };

        let receipt = tokio::time::timeout(
            self.receipt_timeout,
            self.ledger.wait_for_receipt(&tx_hash),
        )
        .await
        .map_err(|_| RegistrationError::ReceiptTimeout(self.receipt_timeout))??;

        if !receipt.success {
            return Err(RegistrationError::Reverted(tx_hash.0));
        }

        self.registered.store(true, Ordering::Release);
        Ok(RegistrationOutcome::Registered(receipt))
    }

    /// Register once; later calls are no-ops. Failures are logged, not returned.
    pub async fn ensure_registered(&self) {
        if self.is_registered() {
            return;
        }

        match self.register_if_needed().await {
            Ok(RegistrationOutcome::Registered(receipt)) => {
                self.metrics.schema_registration("registered");
                tracing::info!(
                    schema_id = %self.schema_id,
                    name = %self.registration.name,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "Schema registered"
                );
            }
            Ok(RegistrationOutcome::AlreadyRegistered) => {
                self.metrics.schema_registration("already_registered");
                tracing::debug!(schema_id = %self.schema_id, "Schema already registered");
            }
            Err(e) => {
                self.metrics.schema_registration("failed");
                tracing::warn!(
                    schema_id = %self.schema_id,
                    error = %e,
                    "Schema registration failed, will retry next cycle"
                );
            }
        }
    }
}
