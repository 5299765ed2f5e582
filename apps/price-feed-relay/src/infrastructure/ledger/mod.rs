//! Ledger Adapters
//!
//! Implementations of the [`LedgerPort`](crate::application::ports::LedgerPort):
//!
//! - **JSON-RPC**: HTTP client for the ledger RPC endpoint
//! - **In-memory**: process-local ledger for tests and dry runs
//!
//! Writes to the JSON-RPC endpoint are signed in process by [`signer`].

pub mod memory;
pub mod rpc;
pub mod signer;

pub use memory::InMemoryLedger;
pub use rpc::{JsonRpcLedger, LedgerReadClient, LedgerWriteClient};

pub use signer::RequestSigner;
