//! Data structures and helpers shared across the importer and API binaries.

mod transaction;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use transaction::*;

/// Upper bound on the length of a ledger address string.
pub const ADDRESS_MAX_LENGTH: usize = 128;

/// Required length (in hex characters) of a ledger transaction identifier.
pub const TXID_LENGTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must not be empty")]
    Empty,
    #[error("address must be at most {ADDRESS_MAX_LENGTH} characters")]
    TooLong,
    #[error("address contains non-alphanumeric characters")]
    InvalidCharacter,
}

/// Validates the shape of a ledger address. Base58 and bech32 encodings both
/// fit inside the ASCII alphanumeric alphabet; checksum validation belongs to
/// the ledger itself.
pub fn validate_address(address: &str) -> Result<(), AddressFormatError> {
    if address.is_empty() {
        return Err(AddressFormatError::Empty);
    }
    if address.len() > ADDRESS_MAX_LENGTH {
        return Err(AddressFormatError::TooLong);
    }
    if !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AddressFormatError::InvalidCharacter);
    }
    Ok(())
}

/// A ledger address. Case is preserved because base58 is case sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressId(String);

impl AddressId {
    pub fn parse(address: &str) -> Result<Self, AddressFormatError> {
        let trimmed = address.trim();
        validate_address(trimmed)?;
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for AddressId {
    type Error = AddressFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AddressId> for String {
    fn from(value: AddressId) -> Self {
        value.0
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxIdFormatError {
    #[error("transaction id must be exactly {TXID_LENGTH} hex characters")]
    WrongLength,
    #[error("transaction id contains non-hex characters")]
    NonHex,
}

/// Validates that the supplied identifier matches the 64 hex-character contract.
pub fn validate_txid(txid: &str) -> Result<(), TxIdFormatError> {
    if txid.len() != TXID_LENGTH {
        return Err(TxIdFormatError::WrongLength);
    }

    if !txid.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TxIdFormatError::NonHex);
    }

    Ok(())
}

/// Ledger-assigned transaction identifier, canonicalised to lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxId(String);

impl TxId {
    pub fn parse(txid: &str) -> Result<Self, TxIdFormatError> {
        validate_txid(txid)?;
        Ok(Self(txid.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for TxId {
    type Error = TxIdFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxId> for String {
    fn from(value: TxId) -> Self {
        value.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An address the system monitors. Key material is supplied by the operator;
/// nothing here derives or validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAddress {
    pub address: AddressId,
    pub public_key: String,
    pub private_key: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrackedAddress {
    pub address: AddressId,
    pub public_key: String,
    pub private_key: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub txid: TxId,
    pub address: AddressId,
    pub amount: Decimal,
    pub description: String,
}

/// Net effect of one transaction on one tracked address. Positive amounts are
/// receipts, negative amounts are sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: i64,
    pub txid: TxId,
    pub address: AddressId,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Result of an idempotent insert: either a fresh row, or the row that was
/// already there (including rows written by a concurrent racer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted<T> {
    Created(T),
    AlreadyExists(T),
}

impl<T> Persisted<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Persisted::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Persisted::Created(value) | Persisted::AlreadyExists(value) => value,
        }
    }

    pub fn into_created(self) -> Option<T> {
        match self {
            Persisted::Created(value) => Some(value),
            Persisted::AlreadyExists(_) => None,
        }
    }
}
