use std::sync::Arc;

use actix_web::{body::to_bytes, http::StatusCode, test, web, App};
use async_trait::async_trait;
use rust_decimal::Decimal;
use txsync_domain::model::{AddressId, RawLeg, RawTransaction};
use txsync_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use txsync_domain::storage::{PaymentStore, TransactionStore};
use txsync_importer::{LedgerSource, SourceError, TransactionImporter};
use txsync_storage::SeaOrmStorage;

use crate::application::{internal_routes, public_routes};
use crate::handlers::addresses::{AddressResponse, RegisterAddressRequest, UpdateAddressRequest};
use crate::handlers::payments::TransactionResponse;
use crate::handlers::refresh::{RefreshRequest, RefreshResponse};
use crate::handlers::PaymentView;
use crate::state::AppState;

const ADDRESS: &str = "1JDfUiJHZ6pDY6wWYTx86RYjDCW7QxCofs";
const EXTERNAL: &str = "1G8A6rRugWuqGpXpRKBip1DpVVUV9KtALK";

fn txid() -> String {
    "c0".repeat(32)
}

/// Every address sees the same single receipt of 0.25 with a 0.01 fee.
struct FixedLedger;

#[async_trait]
impl LedgerSource for FixedLedger {
    async fn fetch_transactions(
        &self,
        _address: &AddressId,
    ) -> Result<Vec<RawTransaction>, SourceError> {
        Ok(vec![RawTransaction {
            identifier: txid(),
            inputs: vec![RawLeg {
                value: Decimal::new(100, 2),
                owner_address: Some(EXTERNAL.into()),
            }],
            outputs: vec![
                RawLeg {
                    value: Decimal::new(25, 2),
                    owner_address: Some(ADDRESS.into()),
                },
                RawLeg {
                    value: Decimal::new(74, 2),
                    owner_address: Some(EXTERNAL.into()),
                },
            ],
        }])
    }
}

struct DownLedger;

#[async_trait]
impl LedgerSource for DownLedger {
    async fn fetch_transactions(
        &self,
        _address: &AddressId,
    ) -> Result<Vec<RawTransaction>, SourceError> {
        Err(SourceError::Unavailable("503 Service Unavailable".into()))
    }
}

async fn storage() -> SeaOrmStorage {
    SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("storage inits")
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

fn build_state(storage: SeaOrmStorage, source: Box<dyn LedgerSource>) -> AppState {
    let importer = TransactionImporter::new(storage.clone(), source);
    AppState::new(storage, Arc::new(importer), telemetry())
}

fn register_body() -> RegisterAddressRequest {
    RegisterAddressRequest {
        address: ADDRESS.into(),
        public_key: "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc".into(),
        private_key: Some("L1aW4aubDFB7yfras2S1mN3bqg9nwySY8nkoLmJebSLD5BWv3ENZ".into()),
        description: "donations".into(),
    }
}

#[actix_web::test]
async fn registers_and_lists_addresses_without_key_material() {
    let state = build_state(storage().await, Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&register_body())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = to_bytes(resp.into_body()).await.unwrap();
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(raw.get("private_key").is_none());
    assert_eq!(raw["has_private_key"], serde_json::Value::Bool(true));

    let duplicate = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&register_body())
            .to_request(),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let listed = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/addresses").to_request(),
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let parsed: Vec<AddressResponse> =
        serde_json::from_slice(&to_bytes(listed.into_body()).await.unwrap()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].address, ADDRESS);
    assert_eq!(parsed[0].description, "donations");
}

#[actix_web::test]
async fn rejects_invalid_address_format() {
    let state = build_state(storage().await, Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;
    let mut body = register_body();
    body.address = "not an address!".into();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn updates_description_only() {
    let state = build_state(storage().await, Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;
    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&register_body())
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/addresses/{ADDRESS}"))
            .set_json(&UpdateAddressRequest {
                description: "cold storage".into(),
            })
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let parsed: AddressResponse =
        serde_json::from_slice(&to_bytes(resp.into_body()).await.unwrap()).unwrap();
    assert_eq!(parsed.description, "cold storage");
    assert!(parsed.has_private_key);

    let missing = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/addresses/{EXTERNAL}"))
            .set_json(&UpdateAddressRequest {
                description: "x".into(),
            })
            .to_request(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn refresh_of_unknown_address_is_not_found() {
    let storage = storage().await;
    let state = build_state(storage.clone(), Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/refresh")
            .set_json(&RefreshRequest {
                addresses: vec![ADDRESS.into()],
            })
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(storage.count_transactions().await.unwrap(), 0);
}

#[actix_web::test]
async fn refresh_then_read_back_payments_and_transaction() {
    let storage = storage().await;
    let state = build_state(storage.clone(), Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(public_routes)
            .configure(internal_routes),
    )
    .await;
    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&register_body())
            .to_request(),
    )
    .await;

    let refresh = || {
        test::TestRequest::post()
            .uri("/api/v1/refresh")
            .set_json(&RefreshRequest {
                addresses: vec![ADDRESS.into()],
            })
            .to_request()
    };

    let first = test::call_service(&app, refresh()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let parsed: RefreshResponse =
        serde_json::from_slice(&to_bytes(first.into_body()).await.unwrap()).unwrap();
    assert_eq!(parsed.payments.len(), 1);
    assert_eq!(parsed.payments[0].amount, Decimal::new(25, 2));

    let second = test::call_service(&app, refresh()).await;
    let parsed: RefreshResponse =
        serde_json::from_slice(&to_bytes(second.into_body()).await.unwrap()).unwrap();
    assert!(parsed.payments.is_empty());
    assert_eq!(storage.count_transactions().await.unwrap(), 1);
    assert_eq!(storage.count_payments().await.unwrap(), 1);

    let payments = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/addresses/{ADDRESS}/payments"))
            .to_request(),
    )
    .await;
    assert_eq!(payments.status(), StatusCode::OK);
    let listed: Vec<PaymentView> =
        serde_json::from_slice(&to_bytes(payments.into_body()).await.unwrap()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].txid, txid());

    let transaction = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/transactions/{}", txid().to_uppercase()))
            .to_request(),
    )
    .await;
    assert_eq!(transaction.status(), StatusCode::OK);
    let parsed: TransactionResponse =
        serde_json::from_slice(&to_bytes(transaction.into_body()).await.unwrap()).unwrap();
    assert_eq!(parsed.fee, Decimal::new(1, 2));
    assert_eq!(parsed.outputs.len(), 2);
    assert_eq!(parsed.payments.len(), 1);
}

#[actix_web::test]
async fn source_outage_maps_to_bad_gateway() {
    let storage = storage().await;
    let state = build_state(storage.clone(), Box::new(DownLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;
    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/addresses")
            .set_json(&register_body())
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/refresh")
            .set_json(&RefreshRequest {
                addresses: vec![ADDRESS.into()],
            })
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(storage.count_payments().await.unwrap(), 0);
}

#[actix_web::test]
async fn public_routes_hide_administration() {
    let state = build_state(storage().await, Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(public_routes),
    )
    .await;

    let refresh = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/refresh")
            .set_json(&RefreshRequest {
                addresses: vec![ADDRESS.into()],
            })
            .to_request(),
    )
    .await;
    assert_eq!(refresh.status(), StatusCode::NOT_FOUND);

    let unknown = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/addresses/{ADDRESS}/payments"))
            .to_request(),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let bad_txid = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/transactions/xyz")
            .to_request(),
    )
    .await;
    assert_eq!(bad_txid.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn metrics_are_served_on_internal_routes() {
    let state = build_state(storage().await, Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(internal_routes),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

fn register(address: &str) -> test::TestRequest {
    let mut body = register_body();
    body.address = address.into();
    test::TestRequest::post()
        .uri("/api/v1/addresses")
        .set_json(&body)
}

fn refresh_of(address: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/refresh")
        .set_json(&RefreshRequest {
            addresses: vec![address.into()],
        })
}

fn payments_of(address: &str) -> test::TestRequest {
    test::TestRequest::get().uri(&format!("/api/v1/addresses/{address}/payments"))
}

#[actix_web::test]
async fn address_registered_after_import_gets_its_payments() {
    let storage = storage().await;
    let state = build_state(storage.clone(), Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(public_routes)
            .configure(internal_routes),
    )
    .await;

    test::call_service(&app, register(ADDRESS).to_request()).await;
    let refreshed = test::call_service(&app, refresh_of(ADDRESS).to_request()).await;
    assert_eq!(refreshed.status(), StatusCode::OK);
    assert_eq!(storage.count_payments().await.unwrap(), 1);

    // EXTERNAL spent 1.00 and got 0.74 back in the stored transaction
    let created = test::call_service(&app, register(EXTERNAL).to_request()).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let payments: Vec<PaymentView> =
        test::call_and_read_body_json(&app, payments_of(EXTERNAL).to_request()).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, Decimal::new(-26, 2));

    let again: RefreshResponse =
        test::call_and_read_body_json(&app, refresh_of(EXTERNAL).to_request()).await;
    assert!(again.payments.is_empty());
    assert_eq!(storage.count_payments().await.unwrap(), 2);
}

#[actix_web::test]
async fn refresh_of_one_address_pays_every_tracked_party() {
    let storage = storage().await;
    let state = build_state(storage.clone(), Box::new(FixedLedger));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(public_routes)
            .configure(internal_routes),
    )
    .await;
    test::call_service(&app, register(ADDRESS).to_request()).await;
    test::call_service(&app, register(EXTERNAL).to_request()).await;

    let refreshed: RefreshResponse =
        test::call_and_read_body_json(&app, refresh_of(ADDRESS).to_request()).await;
    assert_eq!(refreshed.payments.len(), 2);

    let payments: Vec<PaymentView> =
        test::call_and_read_body_json(&app, payments_of(EXTERNAL).to_request()).await;
    assert_eq!(payments.len(), 1);
}
