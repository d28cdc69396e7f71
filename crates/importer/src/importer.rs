use std::collections::HashSet;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use strum_macros::AsRefStr;
use tracing::{debug, info, warn};
use txsync_domain::model::{
    AddressId, PaymentRecord, TrackedAddress, Transaction, TransactionRecord,
};
use txsync_domain::services::KnownTxCache;
use txsync_domain::storage::{PaymentStore, TransactionStore};

use crate::error::ImportError;
use crate::pipeline;
use crate::source::LedgerSource;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Upper bound on ledger source calls in flight during one import.
    pub concurrency: usize,
    /// Stored transactions loaded per round trip while reconciling.
    pub reconcile_page_size: u64,
}

impl ImportOptions {
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const DEFAULT_RECONCILE_PAGE_SIZE: u64 = 500;
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
            reconcile_page_size: Self::DEFAULT_RECONCILE_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum TxDisposition {
    New,
    Known,
}

/// Outcome of [`TransactionImporter::refresh_each`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Payments created by this refresh.
    pub payments: Vec<PaymentRecord>,
    /// Addresses skipped this time, one error each, in input order.
    pub failures: Vec<ImportError>,
}

/// Imports ledger transactions for tracked addresses and derives their
/// payments. Every operation is safe to repeat with the same input.
pub struct TransactionImporter<S, L> {
    storage: S,
    source: L,
    known: KnownTxCache,
    options: ImportOptions,
}

impl<S, L> TransactionImporter<S, L>
where
    S: TransactionStore + PaymentStore,
    L: LedgerSource,
{
    pub fn new(storage: S, source: L) -> Self {
        Self::with_options(storage, source, ImportOptions::default())
    }

    pub fn with_options(storage: S, source: L, options: ImportOptions) -> Self {
        Self {
            storage,
            source,
            known: KnownTxCache::default(),
            options,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Fetches every transaction referencing `addresses`, persists those not
    /// yet stored and returns exactly the newly persisted ones.
    ///
    /// All fetches complete before anything is written. If any address fails,
    /// the first failure in input order is returned and nothing is persisted.
    pub async fn import_for(
        &self,
        addresses: &[TrackedAddress],
    ) -> Result<Vec<TransactionRecord>, ImportError> {
        let mut batches = Vec::new();
        for batch in self.fetch_all(addresses).await {
            // first failure wins, before any write
            batches.push(batch?);
        }
        self.persist_all(batches).await
    }

    /// Persists payments for `transactions` against `addresses`; returns
    /// only payments created by this call.
    pub async fn process_payments_for(
        &self,
        transactions: &[TransactionRecord],
        addresses: &[TrackedAddress],
    ) -> Result<Vec<PaymentRecord>, ImportError> {
        pipeline::process_payments_for(&self.storage, transactions, addresses).await
    }

    /// Import followed by payment processing of the newly imported set.
    pub async fn refresh_for(
        &self,
        addresses: &[TrackedAddress],
    ) -> Result<Vec<PaymentRecord>, ImportError> {
        self.refresh_against(addresses, addresses).await
    }

    /// Imports for `targets` only, then processes the new transactions
    /// against `targets` and every address in `tracked`. A transaction
    /// fetched for one address still pays the other tracked parties in it.
    pub async fn refresh_against(
        &self,
        targets: &[TrackedAddress],
        tracked: &[TrackedAddress],
    ) -> Result<Vec<PaymentRecord>, ImportError> {
        let started = Instant::now();
        let imported = self.import_for(targets).await?;

        // targets first so their payments lead for each transaction
        let payees: Vec<TrackedAddress> = targets.iter().chain(tracked).cloned().collect();
        let payments = self.process_payments_for(&imported, &payees).await?;

        histogram!("importer_refresh_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            addresses = targets.len(),
            transactions = imported.len(),
            payments = payments.len(),
            "refresh complete"
        );
        Ok(payments)
    }

    /// Refreshes `addresses` with failures isolated per address: an address
    /// the ledger source cannot serve is reported in
    /// [`RefreshReport::failures`] while the others are imported and paid.
    /// Only persistence failures abort the whole refresh.
    pub async fn refresh_each(
        &self,
        addresses: &[TrackedAddress],
    ) -> Result<RefreshReport, ImportError> {
        let started = Instant::now();
        let mut report = RefreshReport::default();

        let mut batches = Vec::new();
        for batch in self.fetch_all(addresses).await {
            match batch {
                Ok(transactions) => batches.push(transactions),
                Err(err) if !err.is_fatal() => {
                    counter!("importer_address_failures_total").increment(1);
                    report.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        let imported = self.persist_all(batches).await?;
        // every tracked address, including ones whose own fetch failed
        report.payments = self.process_payments_for(&imported, addresses).await?;

        histogram!("importer_refresh_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            addresses = addresses.len(),
            failed = report.failures.len(),
            transactions = imported.len(),
            payments = report.payments.len(),
            "refresh complete"
        );
        Ok(report)
    }

    /// Processes payments over every stored transaction touching
    /// `addresses`. Recovers payments left behind when a refresh failed
    /// between its import and payment phases, or for addresses registered
    /// after their transactions were imported.
    pub async fn reconcile_for(
        &self,
        addresses: &[TrackedAddress],
    ) -> Result<Vec<PaymentRecord>, ImportError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let page_size = self.options.reconcile_page_size.max(1);
        let mut recovered = Vec::new();
        let mut after_seq = 0;
        loop {
            let page = self
                .storage
                .transactions_after(after_seq, page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after_seq = last.seq;
            // a short page is the last one
            let exhausted = (page.len() as u64) < page_size;

            let relevant: Vec<TransactionRecord> = page
                .into_iter()
                .filter(|record| {
                    addresses
                        .iter()
                        .any(|tracked| record.transaction.touches(&tracked.address))
                })
                .collect();
            recovered.extend(self.process_payments_for(&relevant, addresses).await?);

            if exhausted {
                break;
            }
        }

        if !recovered.is_empty() {
            info!(recovered = recovered.len(), "reconciled missing payments");
        }
        Ok(recovered)
    }

    /// One fetch result per distinct address, in first-occurrence order.
    async fn fetch_all(
        &self,
        addresses: &[TrackedAddress],
    ) -> Vec<Result<Vec<Transaction>, ImportError>> {
        let mut seen = HashSet::new();
        let targets: Vec<&AddressId> = addresses
            .iter()
            .map(|tracked| &tracked.address)
            .filter(|address| seen.insert(*address))
            .collect();

        // `buffered` yields in input order whatever the completion order
        let width = self.options.concurrency.max(1);
        stream::iter(targets)
            .map(|address| self.fetch_for(address))
            .buffered(width)
            .collect()
            .await
    }

    async fn fetch_for(&self, address: &AddressId) -> Result<Vec<Transaction>, ImportError> {
        let raw = match self.source.fetch_transactions(address).await {
            Ok(raw) => {
                counter!("importer_source_calls_total", "result" => "ok").increment(1);
                raw
            }
            Err(err) => {
                counter!("importer_source_calls_total", "result" => "error").increment(1);
                warn!(%address, %err, "ledger source fetch failed");
                return Err(ImportError::from_source(address, err));
            }
        };
        debug!(%address, count = raw.len(), "fetched ledger transactions");

        raw.into_iter()
            .map(|raw| {
                Transaction::try_from(raw).map_err(|err| ImportError::from_format(address, err))
            })
            .collect()
    }

    /// Persists `batches` in order; the first occurrence of a txid wins.
    async fn persist_all(
        &self,
        batches: Vec<Vec<Transaction>>,
    ) -> Result<Vec<TransactionRecord>, ImportError> {
        // shared transactions show up once per address that fetched them
        let mut txids = HashSet::new();
        let candidates: Vec<Transaction> = batches
            .into_iter()
            .flatten()
            .filter(|transaction| txids.insert(transaction.txid.clone()))
            .collect();

        let mut imported = Vec::new();
        for transaction in candidates {
            let disposition = match self.persist_transaction(transaction).await? {
                Some(record) => {
                    imported.push(record);
                    TxDisposition::New
                }
                None => TxDisposition::Known,
            };
            let label = disposition.as_ref().to_owned();
            counter!("importer_transactions_total", "result" => label).increment(1);
        }
        Ok(imported)
    }

    /// Returns the stored record when this call created it, `None` when the
    /// txid was already persisted.
    async fn persist_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Option<TransactionRecord>, ImportError> {
        // cache hits skip the store round trip
        if self.known.is_known(&transaction.txid) {
            return Ok(None);
        }
        // another process may have stored it
        if self.storage.transaction_exists(&transaction.txid).await? {
            self.known.mark_known(&transaction.txid);
            return Ok(None);
        }

        let txid = transaction.txid.clone();
        let persisted = self.storage.insert_transaction(transaction).await?;
        // created or lost the race, the row exists either way
        self.known.mark_known(&txid);
        Ok(persisted.into_created())
    }
}
