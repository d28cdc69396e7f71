use async_trait::async_trait;
use thiserror::Error;
use txsync_domain::model::{AddressId, RawTransaction};

mod esplora;

pub use esplora::EsploraSource;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport failure, timeout, rate limit or non-success status.
    #[error("ledger source unavailable: {0}")]
    Unavailable(String),
    /// The source answered with data that could not be decoded.
    #[error("ledger source returned malformed data: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Malformed(value.to_string())
        } else {
            Self::Unavailable(value.to_string())
        }
    }
}

/// Read-only view of the external ledger.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Every transaction referencing `address` as payer, payee or both, in a
    /// stable order for a given ledger state.
    async fn fetch_transactions(
        &self,
        address: &AddressId,
    ) -> Result<Vec<RawTransaction>, SourceError>;
}

#[async_trait]
impl<T> LedgerSource for Box<T>
where
    T: LedgerSource + ?Sized,
{
    async fn fetch_transactions(
        &self,
        address: &AddressId,
    ) -> Result<Vec<RawTransaction>, SourceError> {
        (**self).fetch_transactions(address).await
    }
}
