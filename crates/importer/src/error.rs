use thiserror::Error;
use txsync_domain::model::{AddressId, TransactionFormatError};
use txsync_domain::storage::StorageError;

use crate::source::SourceError;

/// Failures surfaced by import, payment processing and refresh.
///
/// Uniqueness conflicts never appear here: they are resolved to "already
/// exists" inside the importer and the persister.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("ledger source unavailable for {address}: {reason}")]
    AdapterUnavailable { address: AddressId, reason: String },
    #[error("malformed ledger data for {address}: {reason}")]
    MalformedTransaction { address: AddressId, reason: String },
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StorageError),
}

impl ImportError {
    pub(crate) fn from_source(address: &AddressId, err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(reason) => Self::AdapterUnavailable {
                address: address.clone(),
                reason,
            },
            SourceError::Malformed(reason) => Self::MalformedTransaction {
                address: address.clone(),
                reason,
            },
        }
    }

    pub(crate) fn from_format(address: &AddressId, err: TransactionFormatError) -> Self {
        Self::MalformedTransaction {
            address: address.clone(),
            reason: err.to_string(),
        }
    }

    /// Address whose contribution failed, if the failure is address-scoped.
    pub fn address(&self) -> Option<&AddressId> {
        match self {
            Self::AdapterUnavailable { address, .. } | Self::MalformedTransaction { address, .. } => {
                Some(address)
            }
            Self::PersistenceUnavailable(_) => None,
        }
    }

    /// Adapter-side failures are worth retrying on the next cycle; a store
    /// outage is not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}
