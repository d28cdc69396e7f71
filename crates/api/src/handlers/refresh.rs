use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use tracing::warn;
use txsync_domain::model::AddressId;
use txsync_domain::storage::AddressStore;
use txsync_importer::ImportError;

use crate::state::AppState;

use super::{ApiError, PaymentView};

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub payments: Vec<PaymentView>,
}

#[derive(Debug, Clone, Copy, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum RefreshOutcome {
    Ok,
    UnknownAddress,
    Failed,
}

fn record(outcome: RefreshOutcome) {
    let tag = outcome.as_ref().to_owned();
    counter!("api_refresh_requests_total", "status" => tag).increment(1);
}

/// Refreshes the listed tracked addresses and returns the payments this
/// call created. Every address must already be registered.
///
/// New transactions pay every tracked party in them, not only the listed
/// addresses, and stored transactions of the listed addresses are
/// reconciled so nothing missed earlier stays missing.
pub async fn refresh_handler(
    state: web::Data<AppState>,
    payload: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut targets = Vec::with_capacity(payload.addresses.len());
    for raw in &payload.addresses {
        let address = AddressId::parse(raw)?;
        match state.storage().find_address(&address).await? {
            Some(found) => targets.push(found),
            None => {
                record(RefreshOutcome::UnknownAddress);
                return Err(ApiError::NotFound(format!("address {address}")));
            }
        }
    }
    let tracked = state.storage().list_addresses().await?;

    let importer = state.importer();
    let refreshed = async {
        let mut payments = importer.refresh_against(&targets, &tracked).await?;
        payments.extend(importer.reconcile_for(&targets).await?);
        Ok::<_, ImportError>(payments)
    };
    let payments = refreshed.await.map_err(|err| {
        record(RefreshOutcome::Failed);
        warn!(?err, "on-demand refresh failed");
        err
    })?;
    record(RefreshOutcome::Ok);

    Ok(HttpResponse::Ok().json(RefreshResponse {
        payments: payments.into_iter().map(PaymentView::from).collect(),
    }))
}
