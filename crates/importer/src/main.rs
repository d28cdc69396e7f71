//! Worker binary that keeps payments for every tracked address current.

use std::io;

use txsync_domain::config::WorkerConfig;
use txsync_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use txsync_importer::{run_worker, EsploraSource, ImportOptions, TransactionImporter, WorkerError};
use txsync_storage::SeaOrmStorage;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[worker] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), WorkerError> {
    let config = WorkerConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("WORKER");
    init_telemetry(&telemetry_config)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let source = EsploraSource::new(config.ledger_source_url())?;
    let importer = TransactionImporter::with_options(
        storage,
        source,
        ImportOptions {
            concurrency: config.import_concurrency(),
            ..ImportOptions::default()
        },
    );
    run_worker(&config, importer).await
}
