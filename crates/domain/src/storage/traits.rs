use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    AddressId, NewPayment, NewTrackedAddress, Persisted, PaymentRecord, TrackedAddress,
    Transaction, TransactionRecord, TxId,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store could not be reached or rejected the operation.
    #[error("database error: {0}")]
    Database(String),
    /// A uniqueness constraint was violated.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn insert_address(&self, address: NewTrackedAddress) -> StorageResult<TrackedAddress>;
    async fn find_address(&self, address: &AddressId) -> StorageResult<Option<TrackedAddress>>;
    async fn list_addresses(&self) -> StorageResult<Vec<TrackedAddress>>;
    async fn update_description(
        &self,
        address: &AddressId,
        description: String,
    ) -> StorageResult<Option<TrackedAddress>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction_exists(&self, txid: &TxId) -> StorageResult<bool>;
    /// Inserts unless the txid is already stored; concurrent duplicates resolve
    /// to `AlreadyExists` rather than an error.
    async fn insert_transaction(
        &self,
        transaction: Transaction,
    ) -> StorageResult<Persisted<TransactionRecord>>;
    async fn find_transaction(&self, txid: &TxId) -> StorageResult<Option<TransactionRecord>>;
    /// All transactions in insertion order.
    async fn all_transactions(&self) -> StorageResult<Vec<TransactionRecord>>;
    /// Up to `limit` transactions with `seq` greater than `after_seq`, in
    /// insertion order.
    async fn transactions_after(
        &self,
        after_seq: i64,
        limit: u64,
    ) -> StorageResult<Vec<TransactionRecord>>;
    async fn count_transactions(&self) -> StorageResult<u64>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_payment(
        &self,
        txid: &TxId,
        address: &AddressId,
    ) -> StorageResult<Option<PaymentRecord>>;
    /// Inserts unless a payment for the same (txid, address) pair exists.
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<Persisted<PaymentRecord>>;
    async fn payments_for_transaction(&self, txid: &TxId) -> StorageResult<Vec<PaymentRecord>>;
    async fn payments_for_address(&self, address: &AddressId)
        -> StorageResult<Vec<PaymentRecord>>;
    async fn count_payments(&self) -> StorageResult<u64>;
}
