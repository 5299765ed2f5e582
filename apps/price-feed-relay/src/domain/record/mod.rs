//! Price Records
//!
//! A record is one published, schema-conformant snapshot: a unique
//! [`RecordId`], the [`SchemaId`] it conforms to, and the encoded payload.
//!
//! # Payload Layout
//!
//! The payload uses the contract ABI layout for static fields: one 32-byte
//! big-endian word per schema field, in schema order. Prices are stored as
//! fixed-point integers with 18 decimals, truncated toward zero.
//!
//! ```text
//! | word 0: BTC * 1e18 | word 1: ETH * 1e18 | ... | word n: unix seconds |
//! ```

use std::fmt;

use super::prices::PriceSnapshot;
use super::schema::{FieldSchema, SchemaId};
use super::symbols::Symbol;

/// Size of one encoded field.
pub const WORD_SIZE: usize = 32;

/// Fixed-point scale applied to prices (10^18).
pub const PRICE_SCALE: f64 = 1e18;

// =============================================================================
// Word
// =============================================================================

/// Unsigned 256-bit value stored as one big-endian payload word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Word([u8; WORD_SIZE]);

impl Word {
    /// Zero.
    pub const ZERO: Self = Self([0; WORD_SIZE]);

    /// Wrap big-endian bytes.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; WORD_SIZE]) -> Self {
        Self(bytes)
    }

    /// Big-endian bytes.
    #[must_use]
    pub const fn as_be_bytes(&self) -> &[u8; WORD_SIZE] {
        &self.0
    }

    /// Number of significant bits (0 for zero).
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.0
            .iter()
            .position(|&b| b != 0)
            .map_or(0, |i| {
                let remaining = u32::try_from(WORD_SIZE - i).unwrap_or(0);
                remaining * 8 - self.0[i].leading_zeros()
            })
    }

    /// The value as `u128`, if it fits.
    #[must_use]
    pub fn to_u128(&self) -> Option<u128> {
        let (high, low) = self.0.split_at(WORD_SIZE - 16);
        if high.iter().any(|&b| b != 0) {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(low);
        Some(u128::from_be_bytes(bytes))
    }

    /// Exact value of a non-negative, integral `f64`.
    ///
    /// Returns `None` for negative or non-finite input and for values of
    /// 2^256 or more.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_integral(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        if value < 1.0 {
            return Some(Self::ZERO);
        }

        let bits = value.to_bits();
        let exponent = ((bits >> 52) & 0x7ff) as i32 - 1075;
        let mantissa = (bits & ((1u64 << 52) - 1)) | (1u64 << 52);

        if exponent < 0 {
            // Integral and below 2^53: the shifted-out bits are zero.
            return Some(Self::from(mantissa >> exponent.unsigned_abs()));
        }

        let shift = exponent as u32;
        if shift + 53 > 256 {
            return None;
        }

        // Little-endian 64-bit limbs.
        let mut limbs = [0u64; 4];
        let idx = (shift / 64) as usize;
        let bit = shift % 64;
        limbs[idx] = mantissa << bit;
        if bit > 0 && idx + 1 < limbs.len() {
            limbs[idx + 1] = mantissa >> (64 - bit);
        }

        let mut out = [0u8; WORD_SIZE];
        for (i, limb) in limbs.iter().enumerate() {
            let at = (3 - i) * 8;
            out[at..at + 8].copy_from_slice(&limb.to_be_bytes());
        }
        Some(Self(out))
    }
}

impl From<u128> for Word {
    fn from(value: u128) -> Self {
        let mut out = [0u8; WORD_SIZE];
        out[WORD_SIZE - 16..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self::from(u128::from(value))
    }
}

impl fmt::Display for Word {
    /// Decimal form.
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut n = self.0;
        let mut digits = Vec::new();
        while n.iter().any(|&b| b != 0) {
            let mut rem = 0u32;
            for byte in &mut n {
                let cur = (rem << 8) | u32::from(*byte);
                *byte = (cur / 10) as u8;
                rem = cur % 10;
            }
            digits.push(char::from(b'0' + rem as u8));
        }
        if digits.is_empty() {
            return f.pad("0");
        }
        let text: String = digits.iter().rev().collect();
        f.pad(&text)
    }
}

// =============================================================================
// Fixed Point
// =============================================================================

/// Convert a price to its 18-decimal fixed-point integer, truncating toward zero.
///
/// The multiplication happens in `f64` and the truncated product is carried
/// over exactly, bit for bit. Returns `None` for negative or non-finite
/// prices and for products that do not fit 256 bits.
#[must_use]
pub fn to_fixed_point(price: f64) -> Option<Word> {
    if price.is_nan() || price < 0.0 {
        return None;
    }
    Word::from_integral((price * PRICE_SCALE).trunc())
}

// =============================================================================
// Record Id
// =============================================================================

/// 32-byte record identifier derived from a millisecond timestamp.
///
/// The id holds the decimal digits of the timestamp as UTF-8 bytes,
/// right-padded with zeros to 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId([u8; WORD_SIZE]);

impl RecordId {
    /// Build the id for a millisecond timestamp.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        let digits = millis.to_string();
        let mut bytes = [0u8; WORD_SIZE];
        // u64::MAX has 20 digits, always within one word.
        bytes[..digits.len()].copy_from_slice(digits.as_bytes());
        Self(bytes)
    }

    /// The millisecond timestamp this id was derived from.
    #[must_use]
    pub fn millis(&self) -> Option<u64> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(WORD_SIZE);
        std::str::from_utf8(&self.0[..end]).ok()?.parse().ok()
    }

    /// Raw id bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; WORD_SIZE] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hands out strictly increasing record ids.
///
/// Ids come from the wall clock in milliseconds; when the clock has not moved
/// past the previous id (or went backwards) the previous value plus one is
/// used instead.
#[derive(Debug, Default)]
pub struct RecordIdGenerator {
    last_millis: Option<u64>,
}

impl RecordIdGenerator {
    /// Create a generator with no history.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_millis: None }
    }

    /// Next id for the given clock reading.
    pub fn next_id(&mut self, now_millis: u64) -> RecordId {
        let millis = match self.last_millis {
            Some(last) if now_millis <= last => last.saturating_add(1),
            _ => now_millis,
        };
        self.last_millis = Some(millis);
        RecordId::from_millis(millis)
    }
}

// =============================================================================
// Record
// =============================================================================

/// One encoded snapshot ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique record id.
    pub id: RecordId,
    /// Schema the payload conforms to.
    pub schema_id: SchemaId,
    /// Unix timestamp (seconds) embedded in the payload.
    pub timestamp: u64,
    /// Fixed-point price per symbol, in schema order.
    pub prices: Vec<(Symbol, Word)>,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// Encode a snapshot and wrap the result in a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not match the schema.
    pub fn build(
        id: RecordId,
        schema: &FieldSchema,
        schema_id: SchemaId,
        snapshot: &PriceSnapshot,
        timestamp: u64,
    ) -> Result<Self, EncodeError> {
        let words = encode_words(schema, snapshot, timestamp)?;
        let payload = join_words(&words);
        let prices = snapshot
            .entries()
            .iter()
            .map(|(symbol, _)| symbol.clone())
            .zip(words)
            .collect();
        Ok(Self {
            id,
            schema_id,
            timestamp,
            prices,
            payload,
        })
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a price snapshot and timestamp against `schema`.
///
/// This is a pure function of its inputs.
///
/// # Errors
///
/// Returns an error if the snapshot's symbols differ from the schema's price
/// fields in number, name, or order, or if a price has no fixed-point form
/// within its field's width.
pub fn encode(
    schema: &FieldSchema,
    snapshot: &PriceSnapshot,
    timestamp: u64,
) -> Result<Vec<u8>, EncodeError> {
    encode_words(schema, snapshot, timestamp).map(|words| join_words(&words))
}

fn encode_words(
    schema: &FieldSchema,
    snapshot: &PriceSnapshot,
    timestamp: u64,
) -> Result<Vec<Word>, EncodeError> {
    let price_fields = schema.price_fields();
    if price_fields.len() != snapshot.len() {
        return Err(EncodeError::FieldCountMismatch {
            expected: price_fields.len(),
            actual: snapshot.len(),
        });
    }

    let mut words = Vec::with_capacity(schema.fields().len());

    for (field, (symbol, price)) in price_fields.iter().zip(snapshot.entries()) {
        if field.name != symbol.as_str() {
            return Err(EncodeError::FieldNameMismatch {
                expected: field.name.clone(),
                actual: symbol.to_string(),
            });
        }
        let value = to_fixed_point(*price)
            .filter(|value| field.ty.fits(value))
            .ok_or_else(|| EncodeError::ValueOutOfRange {
                field: field.name.clone(),
                price: *price,
            })?;
        words.push(value);
    }

    words.push(Word::from(timestamp));
    Ok(words)
}

fn join_words(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| *w.as_be_bytes()).collect()
}

/// Errors produced while encoding a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// Snapshot and schema disagree on the number of price fields.
    #[error("schema has {expected} price fields, snapshot has {actual}")]
    FieldCountMismatch {
        /// Price fields in the schema.
        expected: usize,
        /// Entries in the snapshot.
        actual: usize,
    },
    /// Snapshot entry does not line up with the schema field.
    #[error("expected field {expected}, snapshot has {actual}")]
    FieldNameMismatch {
        /// Schema field name.
        expected: String,
        /// Snapshot symbol.
        actual: String,
    },
    /// Price has no fixed-point form within the declared field width.
    #[error("price {price} does not fit field {field}")]
    ValueOutOfRange {
        /// Field name.
        field: String,
        /// Offending price.
        price: f64,
    },
}

// =============================================================================
// Decoding
// =============================================================================

/// A payload decoded back into `(field, value)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Field values in schema order, timestamp last.
    pub fields: Vec<(String, Word)>,
}

impl DecodedRecord {
    /// Value of a named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Word> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    /// Field values without names.
    #[must_use]
    pub fn values(&self) -> Vec<Word> {
        self.fields.iter().map(|(_, v)| *v).collect()
    }
}

/// Decode a payload produced by [`encode`] using the published schema.
///
/// # Errors
///
/// Returns an error if the payload length does not match the schema or a
/// word holds a value wider than its field.
pub fn decode(schema: &FieldSchema, payload: &[u8]) -> Result<DecodedRecord, DecodeError> {
    let expected = schema.fields().len() * WORD_SIZE;
    if payload.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    for (field, chunk) in schema.fields().iter().zip(payload.chunks_exact(WORD_SIZE)) {
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(chunk);
        let value = Word::from_be_bytes(bytes);
        if !field.ty.fits(&value) {
            return Err(DecodeError::Overflow(field.name.clone()));
        }
        fields.push((field.name.clone(), value));
    }

    Ok(DecodedRecord { fields })
}

/// Errors produced while decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload length does not match the schema.
    #[error("payload is {actual} bytes, schema requires {expected}")]
    LengthMismatch {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// A word's value exceeds its declared width.
    #[error("field {0} overflows its declared width")]
    Overflow(String),
}
