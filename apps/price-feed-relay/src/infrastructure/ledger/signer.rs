//! Request Signing
//!
//! Ledger writes are authenticated by an Ed25519 signature over the SHA-256
//! hash of the exact request body. The secret never leaves the process; the
//! relay endpoint receives the public key and the signature as headers.

use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::infrastructure::config::SigningKey;

/// Header carrying the signer's public key (hex).
pub const PUBLIC_KEY_HEADER: &str = "x-ledger-public-key";

/// Header carrying the body signature (hex).
pub const SIGNATURE_HEADER: &str = "x-ledger-signature";

/// Signature headers for one request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Hex public key.
    pub public_key: String,
    /// Hex signature over `sha256(body)`.
    pub signature: String,
}

/// Signs request bodies with the relay's credential.
pub struct RequestSigner {
    key: ed25519_dalek::SigningKey,
}

impl RequestSigner {
    /// Derive the signer from the configured credential.
    #[must_use]
    pub fn new(credential: &SigningKey) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(credential.secret_bytes()),
        }
    }

    /// Hex-encoded public key.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// Sign `body`.
    #[must_use]
    pub fn sign(&self, body: &[u8]) -> SignedHeaders {
        let signature = self.key.sign(&body_digest(body));
        SignedHeaders {
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// Check `headers` against `body`. Returns `false` on any malformed input.
#[must_use]
pub fn verify(body: &[u8], headers: &SignedHeaders) -> bool {
    let Ok(public_key) = hex::decode(&headers.public_key) else {
        return false;
    };
    let Ok(signature) = hex::decode(&headers.signature) else {
        return false;
    };
    let Ok(public_key) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(signature) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
        return false;
    };
    verifying_key
        .verify(&body_digest(body), &Signature::from_bytes(&signature))
        .is_ok()
}

fn body_digest(body: &[u8]) -> [u8; 32] {
    Sha256::digest(body).into()
}
