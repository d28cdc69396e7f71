use std::{path::Path, sync::Arc};

#[cfg(unix)]
use std::fs;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;
use tracing::info;
use txsync_domain::config::{ApiConfig, ConfigError};
use txsync_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use txsync_domain::storage::StorageError;
use txsync_importer::{
    EsploraSource, ImportOptions, LedgerSource, SourceError, TransactionImporter,
};
use txsync_storage::SeaOrmStorage;

use crate::{
    handlers::{
        address_payments_handler, list_addresses_handler, metrics_handler, refresh_handler,
        register_address_handler, transaction_handler, update_address_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let source: Box<dyn LedgerSource> =
        Box::new(EsploraSource::new(config.ledger_source_url())?);
    let importer = TransactionImporter::with_options(
        storage.clone(),
        source,
        ImportOptions {
            concurrency: config.import_concurrency(),
            ..ImportOptions::default()
        },
    );
    // one importer, and so one known-txid cache, for every actix worker
    let state = AppState::new(storage, Arc::new(importer), telemetry);

    // without a dedicated internal listener the admin routes share the public one
    let include_internal_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(|cfg| {
                public_routes(cfg);
                if include_internal_on_public {
                    internal_routes(cfg);
                }
            })
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    let public_server = public_server.run();
    info!("public listener started");

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .configure(internal_routes)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        info!("internal listener started");
        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

/// Read-only views safe to expose publicly.
pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/v1/addresses/{address}/payments",
        web::get().to(address_payments_handler),
    )
    .route("/api/v1/transactions/{txid}", web::get().to(transaction_handler));
}

/// Address administration, on-demand refresh and metrics.
pub fn internal_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/addresses", web::post().to(register_address_handler))
        .route("/api/v1/addresses", web::get().to(list_addresses_handler))
        .route(
            "/api/v1/addresses/{address}",
            web::patch().to(update_address_handler),
        )
        .route("/api/v1/refresh", web::post().to(refresh_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("ledger source error: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A stale socket file from an unclean shutdown makes `bind_uds` fail.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
