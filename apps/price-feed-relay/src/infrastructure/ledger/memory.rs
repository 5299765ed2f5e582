//! In-Memory Ledger
//!
//! A [`LedgerPort`] that keeps registrations and records in process memory.
//! Every write is "mined" into its own block immediately. Used for tests and
//! local dry runs; failures and slow confirmations can be injected.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{
    LedgerError, LedgerErrorKind, LedgerPort, Receipt, RecordSubmission, SchemaRegistration,
    TxHash,
};
use crate::domain::schema::SchemaId;

#[derive(Debug, Default)]
struct State {
    schemas: HashMap<SchemaId, SchemaRegistration>,
    records: Vec<RecordSubmission>,
    receipts: HashMap<TxHash, Receipt>,
    next_block: u64,
    fail_next_submit: Option<LedgerError>,
    receipt_delay: Duration,
}

impl State {
    fn mine(&mut self) -> TxHash {
        self.next_block += 1;
        let tx_hash = TxHash(format!("0x{:064x}", self.next_block));
        self.receipts.insert(
            tx_hash.clone(),
            Receipt {
                tx_hash: tx_hash.clone(),
                block_number: self.next_block,
                success: true,
            },
        );
        tx_hash
    }
}

/// Ledger held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records submitted so far, in order.
    #[must_use]
    pub fn records(&self) -> Vec<RecordSubmission> {
        self.state.lock().records.clone()
    }

    /// Whether a schema with this id has been registered.
    #[must_use]
    pub fn has_schema(&self, schema_id: &SchemaId) -> bool {
        self.state.lock().schemas.contains_key(schema_id)
    }

    /// Fail the next record submission with `error`.
    pub fn fail_next_submission(&self, error: LedgerError) {
        self.state.lock().fail_next_submit = Some(error);
    }

    /// Delay every receipt wait by `delay`.
    pub fn set_receipt_delay(&self, delay: Duration) {
        self.state.lock().receipt_delay = delay;
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn register_schema(
        &self,
        registration: &SchemaRegistration,
    ) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock();
        let schema_id = SchemaId::compute(&registration.schema);
        if state.schemas.contains_key(&schema_id) {
            return Err(LedgerError::new(
                LedgerErrorKind::AlreadyRegistered,
                format!("schema {schema_id} already registered"),
            ));
        }
        state.schemas.insert(schema_id, registration.clone());
        Ok(state.mine())
    }

    async fn submit_records(&self, records: &[RecordSubmission]) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_submit.take() {
            return Err(error);
        }
        state.records.extend_from_slice(records);
        Ok(state.mine())
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        let delay = self.state.lock().receipt_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().receipts.get(tx_hash).cloned().ok_or_else(|| {
            LedgerError::new(
                LedgerErrorKind::InvalidResponse,
                format!("unknown transaction {tx_hash}"),
            )
        })
    }
}
