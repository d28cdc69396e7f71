use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use txsync_domain::model::{AddressId, TxId, TxInput, TxOutput};
use txsync_domain::storage::{AddressStore, PaymentStore, TransactionStore};

use crate::state::AppState;

use super::{ApiError, PaymentView};

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: Decimal,
    pub imported_at: DateTime<Utc>,
    pub payments: Vec<PaymentView>,
}

pub async fn address_payments_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let address = AddressId::parse(&path.into_inner())?;
    if state.storage().find_address(&address).await?.is_none() {
        return Err(ApiError::NotFound(format!("address {address}")));
    }

    let payments: Vec<PaymentView> = state
        .storage()
        .payments_for_address(&address)
        .await?
        .into_iter()
        .map(PaymentView::from)
        .collect();
    Ok(HttpResponse::Ok().json(payments))
}

pub async fn transaction_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let txid = TxId::parse(&path.into_inner())?;
    let record = state
        .storage()
        .find_transaction(&txid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("transaction {txid}")))?;
    let payments = state
        .storage()
        .payments_for_transaction(&txid)
        .await?
        .into_iter()
        .map(PaymentView::from)
        .collect();

    let fee = record.transaction.fee();
    Ok(HttpResponse::Ok().json(TransactionResponse {
        txid: record.transaction.txid.into_inner(),
        inputs: record.transaction.inputs,
        outputs: record.transaction.outputs,
        fee,
        imported_at: record.imported_at,
        payments,
    }))
}
