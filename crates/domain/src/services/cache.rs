use std::time::Duration;

use moka::sync::Cache;

use crate::model::TxId;

/// Remembers transaction ids already known to be persisted so repeated
/// refreshes skip the store round-trip. Only positive knowledge is cached:
/// an id missing from the cache says nothing about the store.
#[derive(Debug, Clone)]
pub struct KnownTxCache {
    positives: Cache<String, ()>,
}

impl KnownTxCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            positives: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub fn is_known(&self, txid: &TxId) -> bool {
        self.positives.contains_key(txid.as_str())
    }

    pub fn mark_known(&self, txid: &TxId) {
        self.positives.insert(txid.as_str().to_owned(), ());
    }
}

impl Default for KnownTxCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
