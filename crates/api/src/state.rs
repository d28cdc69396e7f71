use std::sync::Arc;

use txsync_domain::services::telemetry::TelemetryGuard;
use txsync_importer::{LedgerSource, TransactionImporter};
use txsync_storage::SeaOrmStorage;

pub type Importer = TransactionImporter<SeaOrmStorage, Box<dyn LedgerSource>>;

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    importer: Arc<Importer>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(storage: SeaOrmStorage, importer: Arc<Importer>, telemetry: TelemetryGuard) -> Self {
        Self {
            storage,
            importer,
            telemetry,
        }
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn importer(&self) -> &Importer {
        self.importer.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
