pub mod addresses;
pub mod metrics;
pub mod payments;
pub mod refresh;

pub use addresses::{list_addresses_handler, register_address_handler, update_address_handler};
pub use metrics::metrics_handler;
pub use payments::{address_payments_handler, transaction_handler};
pub use refresh::refresh_handler;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use txsync_domain::model::{AddressFormatError, PaymentRecord, TxIdFormatError};
use txsync_domain::storage::StorageError;
use txsync_importer::ImportError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressFormatError),
    #[error("invalid transaction id: {0}")]
    InvalidTxid(#[from] TxIdFormatError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("address already tracked")]
    AlreadyTracked,
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress(_) | ApiError::InvalidTxid(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyTracked => StatusCode::CONFLICT,
            ApiError::Import(err) if err.is_fatal() => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Import(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentView {
    pub id: i64,
    pub txid: String,
    pub address: String,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentView {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            txid: record.txid.into_inner(),
            address: record.address.into_inner(),
            amount: record.amount,
            description: record.description,
            created_at: record.created_at,
        }
    }
}
