//! Import/reconciliation engine: pulls transactions for tracked addresses
//! from a ledger source, stores each transaction once, and derives one
//! payment per (transaction, tracked address) pair.
//!
//! The `txsync-worker` binary in `main.rs` polls on an interval; the API
//! crate embeds the same [`TransactionImporter`] for on-demand refreshes.

pub mod error;
pub mod importer;
pub mod pipeline;
pub mod source;
pub mod worker;

pub use error::ImportError;
pub use importer::{ImportOptions, RefreshReport, TransactionImporter};
pub use pipeline::{persist_payment, process_payments_for};
pub use source::{EsploraSource, LedgerSource, SourceError};
pub use worker::{refresh_cycle, run_worker, WorkerError, WorkerState};
