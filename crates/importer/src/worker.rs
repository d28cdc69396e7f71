use std::collections::HashSet;

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use txsync_domain::{
    config::{ConfigError, WorkerConfig},
    model::{AddressId, TrackedAddress},
    services::telemetry::TelemetryError,
    storage::{AddressStore, PaymentStore, StorageError, TransactionStore},
};

use crate::error::ImportError;
use crate::importer::TransactionImporter;
use crate::source::{LedgerSource, SourceError};

/// Every this many cycles all addresses are reconciled again, which picks up
/// payments lost to refreshes that failed halfway in other processes.
const FULL_RECONCILE_EVERY: u64 = 60;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("import error: {0}")]
    Import(#[from] ImportError),
    #[error("ledger source error: {0}")]
    Source(#[from] SourceError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// What the worker remembers between cycles.
#[derive(Debug, Default)]
pub struct WorkerState {
    reconciled: HashSet<AddressId>,
    cycles: u64,
}

/// Refreshes every tracked address on `config.refresh_interval()` until a
/// fatal error occurs. Ledger source failures are logged and retried on the
/// next cycle. The first cycle reconciles every address.
pub async fn run_worker<S, L>(
    config: &WorkerConfig,
    importer: TransactionImporter<S, L>,
) -> Result<(), WorkerError>
where
    S: AddressStore + TransactionStore + PaymentStore,
    L: LedgerSource,
{
    let mut state = WorkerState::default();
    loop {
        refresh_cycle(&importer, &mut state).await?;
        sleep(config.refresh_interval()).await;
    }
}

/// One pass over all tracked addresses. Returns the number of payments
/// created, recovered ones included.
///
/// Addresses the ledger source fails on are skipped for this cycle only.
/// Addresses not seen by an earlier cycle are reconciled first, so a wallet
/// registered after its transactions were imported still gets its payments.
pub async fn refresh_cycle<S, L>(
    importer: &TransactionImporter<S, L>,
    state: &mut WorkerState,
) -> Result<usize, WorkerError>
where
    S: AddressStore + TransactionStore + PaymentStore,
    L: LedgerSource,
{
    let addresses = importer.storage().list_addresses().await?;
    gauge!("worker_tracked_addresses").set(addresses.len() as f64);

    // newly registered addresses, or all of them on a sweep cycle
    let sweep = state.cycles % FULL_RECONCILE_EVERY == 0;
    let pending: Vec<TrackedAddress> = addresses
        .iter()
        .filter(|tracked| sweep || !state.reconciled.contains(&tracked.address))
        .cloned()
        .collect();
    let recovered = importer.reconcile_for(&pending).await?;
    debug!(reconciled = pending.len(), sweep, "reconcile pass done");
    state
        .reconciled
        .extend(pending.into_iter().map(|tracked| tracked.address));
    state.cycles += 1;

    // store outages abort the cycle; source failures only skip their address
    let report = importer.refresh_each(&addresses).await?;
    for failure in &report.failures {
        counter!("worker_skipped_addresses_total").increment(1);
        warn!(%failure, "address skipped, retrying next cycle");
    }

    let created = recovered.len() + report.payments.len();
    if created > 0 {
        info!(count = created, "recorded new payments");
    }
    Ok(created)
}
