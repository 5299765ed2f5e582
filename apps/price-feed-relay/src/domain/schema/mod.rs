//! Record Field Schema
//!
//! The fixed, ordered field list every published record conforms to: one
//! `uint256` price field per tracked symbol followed by a `uint64` timestamp.
//! The schema's canonical text (`uint256 BTC, uint256 ETH, uint64 timestamp`)
//! is hashed with Keccak-256 into a [`SchemaId`], the same id ledger-side
//! consumers compute to look records up, so identical text must always
//! produce the identical identifier.

use std::fmt;

use sha3::{Digest, Keccak256};

use super::record::Word;
use super::symbols::TrackedSymbols;

/// Name of the trailing timestamp field.
pub const TIMESTAMP_FIELD: &str = "timestamp";

// =============================================================================
// Field Types
// =============================================================================

/// Unsigned integer field types supported by the record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 256-bit unsigned integer.
    Uint256,
    /// 64-bit unsigned integer.
    Uint64,
}

impl FieldType {
    /// Canonical type name used in schema text.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uint256 => "uint256",
            Self::Uint64 => "uint64",
        }
    }

    /// Declared width in bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        match self {
            Self::Uint256 => 256,
            Self::Uint64 => 64,
        }
    }

    /// Whether `value` fits the declared width.
    #[must_use]
    pub fn fits(&self, value: &Word) -> bool {
        value.bit_len() <= self.bits()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named, typed schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: FieldType,
}

// =============================================================================
// Field Schema
// =============================================================================

/// Ordered record schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<Field>,
}

impl FieldSchema {
    /// Build the price schema for a tracked symbol set.
    #[must_use]
    pub fn for_symbols(symbols: &TrackedSymbols) -> Self {
        let fields = symbols
            .iter()
            .map(|symbol| Field {
                name: symbol.as_str().to_string(),
                ty: FieldType::Uint256,
            })
            .chain(std::iter::once(Field {
                name: TIMESTAMP_FIELD.to_string(),
                ty: FieldType::Uint64,
            }))
            .collect();
        Self { fields }
    }

    /// Build a schema from an explicit field list.
    #[must_use]
    pub const fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Price fields (all but the trailing timestamp).
    #[must_use]
    pub fn price_fields(&self) -> &[Field] {
        match self.fields.split_last() {
            Some((last, rest)) if last.name == TIMESTAMP_FIELD => rest,
            _ => &self.fields,
        }
    }

    /// Canonical schema text, e.g. `uint256 BTC, uint64 timestamp`.
    #[must_use]
    pub fn text(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{} {}", f.ty, f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Deterministic identifier derived from the canonical text.
    #[must_use]
    pub fn id(&self) -> SchemaId {
        SchemaId::compute(&self.text())
    }
}

// =============================================================================
// Schema Id
// =============================================================================

/// 32-byte schema identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId([u8; 32]);

impl SchemaId {
    /// The all-zero identifier, used as "no parent schema".
    pub const ZERO: Self = Self([0; 32]);

    /// Keccak-256 of the schema text.
    #[must_use]
    pub fn compute(schema_text: &str) -> Self {
        Self(Keccak256::digest(schema_text.as_bytes()).into())
    }

    /// Wrap raw identifier bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(symbols: &[&str]) -> FieldSchema {
        FieldSchema::for_symbols(&TrackedSymbols::new(symbols).unwrap())
    }

    #[test]
    fn canonical_text_matches_field_order() {
        assert_eq!(
            schema(&["BTC", "ETH"]).text(),
            "uint256 BTC, uint256 ETH, uint64 timestamp"
        );
    }

    #[test]
    fn timestamp_is_last_field() {
        let schema = schema(&["BTC", "ETH"]);
        let last = schema.fields().last().unwrap();
        assert_eq!(last.name, TIMESTAMP_FIELD);
        assert_eq!(last.ty, FieldType::Uint64);
        assert_eq!(schema.price_fields().len(), 2);
    }

    #[test]
    fn id_is_deterministic() {
        let a = schema(&["BTC", "ETH"]).id();
        let b = schema(&["BTC", "ETH"]).id();
        assert_eq!(a, b);
        assert_eq!(a, SchemaId::compute("uint256 BTC, uint256 ETH, uint64 timestamp"));
    }

    #[test]
    fn reordered_fields_change_id() {
        assert_ne!(schema(&["BTC", "ETH"]).id(), schema(&["ETH", "BTC"]).id());
    }

    #[test]
    fn hex_form_is_prefixed_and_full_length() {
        let hex = schema(&["BTC"]).id().to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
        assert_eq!(SchemaId::ZERO.to_hex(), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn id_is_keccak256_of_text() {
        assert_eq!(
            SchemaId::compute("").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            SchemaId::compute("abc").to_hex(),
            "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn uint64_width_is_enforced() {
        assert!(FieldType::Uint64.fits(&Word::from(u64::MAX)));
        assert!(!FieldType::Uint64.fits(&Word::from(u128::from(u64::MAX) + 1)));
        assert!(FieldType::Uint256.fits(&Word::from_be_bytes([0xff; 32])));
    }
}
