use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use txsync_domain::model::{AddressId, NewTrackedAddress, TrackedAddress};
use txsync_domain::storage::{AddressStore, StorageError};

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterAddressRequest {
    pub address: String,
    pub public_key: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateAddressRequest {
    pub description: String,
}

/// Public view of a tracked address. Key material stays server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
    pub public_key: String,
    pub has_private_key: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<TrackedAddress> for AddressResponse {
    fn from(tracked: TrackedAddress) -> Self {
        Self {
            address: tracked.address.into_inner(),
            public_key: tracked.public_key,
            has_private_key: tracked.private_key.is_some(),
            description: tracked.description,
            created_at: tracked.created_at,
        }
    }
}

pub async fn register_address_handler(
    state: web::Data<AppState>,
    payload: web::Json<RegisterAddressRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let address = AddressId::parse(&payload.address).inspect_err(|_| {
        counter!("api_address_requests_total", "status" => "invalid").increment(1);
    })?;

    let inserted = state
        .storage()
        .insert_address(NewTrackedAddress {
            address,
            public_key: payload.public_key,
            private_key: payload.private_key,
            description: payload.description,
        })
        .await;

    match inserted {
        Ok(tracked) => {
            counter!("api_address_requests_total", "status" => "created").increment(1);
            // transactions already stored may involve the new address; the
            // worker reconciles it too, so a failure here is not fatal
            match state
                .importer()
                .reconcile_for(std::slice::from_ref(&tracked))
                .await
            {
                Ok(recovered) if !recovered.is_empty() => {
                    info!(address = %tracked.address, count = recovered.len(), "backfilled payments");
                }
                Ok(_) => {}
                Err(err) => warn!(address = %tracked.address, ?err, "backfill failed"),
            }
            Ok(HttpResponse::Created().json(AddressResponse::from(tracked)))
        }
        Err(StorageError::Conflict(_)) => {
            counter!("api_address_requests_total", "status" => "conflict").increment(1);
            Err(ApiError::AlreadyTracked)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn list_addresses_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let addresses: Vec<AddressResponse> = state
        .storage()
        .list_addresses()
        .await?
        .into_iter()
        .map(AddressResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(addresses))
}

/// Description is the only mutable attribute of a tracked address.
pub async fn update_address_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateAddressRequest>,
) -> Result<HttpResponse, ApiError> {
    let address = AddressId::parse(&path.into_inner())?;
    let updated = state
        .storage()
        .update_description(&address, payload.into_inner().description)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("address {address}")))?;
    Ok(HttpResponse::Ok().json(AddressResponse::from(updated)))
}
