//! JSON-RPC Ledger Client
//!
//! Talks to the ledger's JSON-RPC endpoint over HTTP. Reads (receipt
//! lookups) go through [`LedgerReadClient`]; writes (schema registration,
//! record submission) go through [`LedgerWriteClient`], which signs each
//! request body locally (see [`super::signer`]). The credential itself is
//! never sent.
//!
//! # Methods
//!
//! | Operation          | Method                         |
//! |--------------------|--------------------------------|
//! | register schema    | `streams_registerDataSchemas`  |
//! | submit records     | `streams_set`                  |
//! | receipt lookup     | `eth_getTransactionReceipt`    |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::ports::{
    LedgerError, LedgerErrorKind, LedgerPort, Receipt, RecordSubmission, SchemaRegistration,
    TxHash,
};
use super::signer::{PUBLIC_KEY_HEADER, RequestSigner, SIGNATURE_HEADER};
use crate::infrastructure::config::{LedgerSettings, SigningKey};

const METHOD_REGISTER_SCHEMAS: &str = "streams_registerDataSchemas";
const METHOD_SET_RECORDS: &str = "streams_set";
const METHOD_GET_RECEIPT: &str = "eth_getTransactionReceipt";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: String,
    status: String,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<Receipt, LedgerError> {
        let block_number = parse_quantity(&self.block_number)?;
        Ok(Receipt {
            tx_hash: TxHash(self.transaction_hash),
            block_number,
            success: parse_quantity(&self.status)? == 1,
        })
    }
}

fn parse_quantity(value: &str) -> Result<u64, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|_| {
        LedgerError::new(
            LedgerErrorKind::InvalidResponse,
            format!("invalid hex quantity {value:?}"),
        )
    })
}

fn classify_rpc_error(error: &RpcErrorObject) -> LedgerErrorKind {
    let message = error.message.to_ascii_lowercase();
    if message.contains("already registered") || message.contains("schemaalreadyregistered") {
        LedgerErrorKind::AlreadyRegistered
    } else {
        LedgerErrorKind::Rejected
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug)]
struct RpcTransport {
    http: Client,
    url: String,
    signer: Option<RequestSigner>,
    next_id: AtomicU64,
}

impl RpcTransport {
    fn new(
        url: &str,
        timeout: Duration,
        signer: Option<RequestSigner>,
    ) -> Result<Self, LedgerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::new(LedgerErrorKind::Transport, e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
            signer,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, T>(&self, method: &str, params: P) -> Result<Option<T>, LedgerError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let body = serde_json::to_vec(&request)
            .map_err(|e| LedgerError::new(LedgerErrorKind::InvalidResponse, e.to_string()))?;

        let mut builder = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signer) = &self.signer {
            let signed = signer.sign(&body);
            builder = builder
                .header(PUBLIC_KEY_HEADER, signed.public_key)
                .header(SIGNATURE_HEADER, signed.signature);
        }
        let builder = builder.body(body);

        let response = builder
            .send()
            .await
            .map_err(|e| LedgerError::new(LedgerErrorKind::Transport, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = if status.is_server_error() {
                LedgerErrorKind::Transport
            } else {
                LedgerErrorKind::Rejected
            };
            return Err(LedgerError::new(kind, format!("HTTP {status}: {body}")));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::new(LedgerErrorKind::InvalidResponse, e.to_string()))?;

        if let Some(error) = body.error {
            return Err(LedgerError::new(
                classify_rpc_error(&error),
                format!("{method} failed ({}): {}", error.code, error.message),
            ));
        }

        Ok(body.result)
    }

    async fn call_required<P, T>(&self, method: &str, params: P) -> Result<T, LedgerError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        self.call(method, params).await?.ok_or_else(|| {
            LedgerError::new(
                LedgerErrorKind::InvalidResponse,
                format!("{method} returned no result"),
            )
        })
    }
}

// =============================================================================
// Read Client
// =============================================================================

/// Read-only ledger client (receipt lookups).
#[derive(Debug)]
pub struct LedgerReadClient {
    transport: RpcTransport,
    poll_interval: Duration,
}

impl LedgerReadClient {
    /// Create a read client for `rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(rpc_url: &str, settings: &LedgerSettings) -> Result<Self, LedgerError> {
        Ok(Self {
            transport: RpcTransport::new(rpc_url, settings.http_timeout, None)?,
            poll_interval: settings.receipt_poll_interval,
        })
    }

    /// Look up a receipt; `None` while the transaction is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or the receipt is malformed.
    pub async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, LedgerError> {
        let receipt: Option<RpcReceipt> = self
            .transport
            .call(METHOD_GET_RECEIPT, json!([tx_hash.0]))
            .await?;
        receipt.map(RpcReceipt::into_receipt).transpose()
    }

    /// Poll until the transaction has a receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails. Callers bound the wait.
    pub async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        loop {
            if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            tracing::trace!(tx_hash = %tx_hash, "Receipt pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// =============================================================================
// Write Client
// =============================================================================

/// Ledger client for signed writes.
#[derive(Debug)]
pub struct LedgerWriteClient {
    transport: RpcTransport,
}

impl LedgerWriteClient {
    /// Create a write client for `rpc_url` signing with `key`.
    ///
    /// Only the derived signer is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        rpc_url: &str,
        key: &SigningKey,
        settings: &LedgerSettings,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            transport: RpcTransport::new(
                rpc_url,
                settings.http_timeout,
                Some(RequestSigner::new(key)),
            )?,
        })
    }

    /// Submit schema registrations.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error, classified.
    pub async fn register_data_schemas(
        &self,
        registrations: &[SchemaRegistration],
    ) -> Result<TxHash, LedgerError> {
        let schemas: Vec<_> = registrations
            .iter()
            .map(|r| {
                json!({
                    "schemaName": r.name,
                    "schema": r.schema,
                    "parentSchemaId": r.parent.to_hex(),
                })
            })
            .collect();
        let hash: String = self
            .transport
            .call_required(METHOD_REGISTER_SCHEMAS, json!([schemas, true]))
            .await?;
        Ok(TxHash(hash))
    }

    /// Submit records.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error, classified.
    pub async fn set_records(&self, records: &[RecordSubmission]) -> Result<TxHash, LedgerError> {
        let records: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "id": r.id.to_hex(),
                    "schemaId": r.schema_id.to_hex(),
                    "data": format!("0x{}", hex::encode(&r.payload)),
                })
            })
            .collect();
        let hash: String = self
            .transport
            .call_required(METHOD_SET_RECORDS, json!([records]))
            .await?;
        Ok(TxHash(hash))
    }
}

// =============================================================================
// Ledger Port Adapter
// =============================================================================

/// [`LedgerPort`] backed by the JSON-RPC read and write clients.
#[derive(Debug)]
pub struct JsonRpcLedger {
    read: LedgerReadClient,
    write: LedgerWriteClient,
}

impl JsonRpcLedger {
    /// Build both clients for `rpc_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if either client cannot be constructed.
    pub fn connect(
        rpc_url: &str,
        key: &SigningKey,
        settings: &LedgerSettings,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            read: LedgerReadClient::new(rpc_url, settings)?,
            write: LedgerWriteClient::new(rpc_url, key, settings)?,
        })
    }
}

#[async_trait]
impl LedgerPort for JsonRpcLedger {
    async fn register_schema(
        &self,
        registration: &SchemaRegistration,
    ) -> Result<TxHash, LedgerError> {
        self.write
            .register_data_schemas(std::slice::from_ref(registration))
            .await
    }

    async fn submit_records(&self, records: &[RecordSubmission]) -> Result<TxHash, LedgerError> {
        self.write.set_records(records).await
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        self.read.wait_for_receipt(tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::record::RecordId;
    use crate::infrastructure::ledger::signer::{SignedHeaders, verify};
    use crate::domain::schema::SchemaId;

    const KEY: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn settings() -> LedgerSettings {
        LedgerSettings {
            http_timeout: Duration::from_secs(2),
            receipt_poll_interval: Duration::from_millis(10),
            ..LedgerSettings::default()
        }
    }

    fn ledger(server: &MockServer) -> JsonRpcLedger {
        JsonRpcLedger::connect(&server.uri(), &SigningKey::parse(KEY).unwrap(), &settings()).unwrap()
    }

    fn registration() -> SchemaRegistration {
        SchemaRegistration {
            name: "somnixPriceFeeds".to_string(),
            schema: "uint256 BTC, uint64 timestamp".to_string(),
            parent: SchemaId::ZERO,
        }
    }

    #[tokio::test]
    async fn submit_records_sends_hex_fields() {
        let server = MockServer::start().await;
        let record = RecordSubmission {
            id: RecordId::from_millis(1_700_000_000_000),
            schema_id: SchemaId::ZERO,
            payload: vec![0xab, 0xcd],
        };

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "streams_set",
                "params": [[{
                    "id": record.id.to_hex(),
                    "schemaId": SchemaId::ZERO.to_hex(),
                    "data": "0xabcd",
                }]],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "0xfeed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hash = ledger(&server).submit_records(&[record]).await.unwrap();
        assert_eq!(hash, TxHash("0xfeed".to_string()));
    }

    #[tokio::test]
    async fn writes_carry_a_body_signature_and_never_the_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "0xfeed"
            })))
            .mount(&server)
            .await;

        ledger(&server).submit_records(&[]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        let header_value = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap()
                .to_string()
        };
        let signed = SignedHeaders {
            public_key: header_value(PUBLIC_KEY_HEADER),
            signature: header_value(SIGNATURE_HEADER),
        };
        assert!(verify(&request.body, &signed));
        assert_eq!(
            signed.public_key,
            RequestSigner::new(&SigningKey::parse(KEY).unwrap()).public_key_hex()
        );

        assert!(request.headers.get("authorization").is_none());
        for (_, value) in &request.headers {
            assert!(!value.to_str().unwrap_or_default().contains(KEY));
        }
        assert!(!String::from_utf8_lossy(&request.body).contains(KEY));
    }

    #[tokio::test]
    async fn reads_are_unsigned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let read = LedgerReadClient::new(&server.uri(), &settings()).unwrap();
        read.transaction_receipt(&TxHash("0x01".to_string()))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn already_registered_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "streams_registerDataSchemas" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": 3, "message": "execution reverted: SchemaAlreadyRegistered()" }
            })))
            .mount(&server)
            .await;

        let err = ledger(&server)
            .register_schema(&registration())
            .await
            .unwrap_err();
        assert!(err.is_already_registered());
    }

    #[tokio::test]
    async fn other_rpc_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32000, "message": "insufficient funds" }
            })))
            .mount(&server)
            .await;

        let err = ledger(&server)
            .register_schema(&registration())
            .await
            .unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::Rejected);
    }

    #[tokio::test]
    async fn server_errors_are_transport_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = ledger(&server).submit_records(&[]).await.unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::Transport);
    }

    #[tokio::test]
    async fn receipt_is_parsed_from_hex_quantities() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getTransactionReceipt",
                "params": ["0xfeed"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "transactionHash": "0xfeed", "blockNumber": "0x1b4", "status": "0x0" }
            })))
            .mount(&server)
            .await;

        let receipt = ledger(&server)
            .wait_for_receipt(&TxHash("0xfeed".to_string()))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 436);
        assert!(!receipt.success);
    }

    #[tokio::test]
    async fn pending_receipt_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let read = LedgerReadClient::new(&server.uri(), &settings()).unwrap();
        let receipt = read
            .transaction_receipt(&TxHash("0x01".to_string()))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("0x1").unwrap(), 1);
        assert_eq!(parse_quantity("ff").unwrap(), 255);
        assert!(parse_quantity("0xzz").is_err());
    }
}
