//! Domain-level building blocks shared across the importer and API crates.
//!
//! Holds the address/transaction/payment model, the pure payment netting
//! rules, repository traits implemented by the storage crate, and the
//! environment + telemetry bootstrap shared by every binary.

pub mod accounting;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use accounting::*;
pub use model::*;
pub use storage::*;
