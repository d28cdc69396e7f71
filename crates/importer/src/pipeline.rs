use std::collections::HashSet;

use metrics::counter;
use rust_decimal::Decimal;
use tracing::debug;
use txsync_domain::accounting::{compute_payment, describe_payment};
use txsync_domain::model::{
    AddressId, NewPayment, PaymentRecord, Persisted, TrackedAddress, Transaction,
    TransactionRecord,
};
use txsync_domain::storage::PaymentStore;

use crate::error::ImportError;

/// Stores the payment for (`transaction`, `address`) unless one already
/// exists, in which case the existing row is returned untouched.
pub async fn persist_payment<S>(
    storage: &S,
    transaction: &Transaction,
    address: &AddressId,
    amount: Decimal,
    description: String,
) -> Result<Persisted<PaymentRecord>, ImportError>
where
    S: PaymentStore,
{
    // step 1: an existing row is final, amounts are never rewritten
    if let Some(existing) = storage.find_payment(&transaction.txid, address).await? {
        counter!("importer_payments_total", "result" => "existing").increment(1);
        return Ok(Persisted::AlreadyExists(existing));
    }

    // step 2: insert; the store ignores a duplicate (txid, address) pair
    let outcome = storage
        .insert_payment(NewPayment {
            txid: transaction.txid.clone(),
            address: address.clone(),
            amount,
            description,
        })
        .await;

    let persisted = match outcome {
        Ok(persisted) => persisted,
        // a concurrent writer won the unique (txid, address) slot
        Err(err) if err.is_conflict() => {
            let existing = storage
                .find_payment(&transaction.txid, address)
                .await?
                .ok_or(ImportError::PersistenceUnavailable(err))?;
            Persisted::AlreadyExists(existing)
        }
        Err(err) => return Err(err.into()),
    };

    // step 3: count by outcome
    let result = if persisted.is_created() {
        "created"
    } else {
        "existing"
    };
    counter!("importer_payments_total", "result" => result).increment(1);
    Ok(persisted)
}

/// Derives and persists payments for every (transaction, tracked address)
/// pair where the address has a role. Returns only newly created payments,
/// ordered by transaction first, then by address in the order supplied.
pub async fn process_payments_for<S>(
    storage: &S,
    transactions: &[TransactionRecord],
    addresses: &[TrackedAddress],
) -> Result<Vec<PaymentRecord>, ImportError>
where
    S: PaymentStore,
{
    // duplicate addresses would only repeat lookups
    let mut seen = HashSet::new();
    let addresses: Vec<&AddressId> = addresses
        .iter()
        .map(|tracked| &tracked.address)
        .filter(|address| seen.insert(*address))
        .collect();

    let mut created = Vec::new();
    for record in transactions {
        let transaction = &record.transaction;
        for address in &addresses {
            // no leg owned by the address, nothing to record
            let Some(amount) = compute_payment(transaction, address) else {
                continue;
            };
            let description = describe_payment(&transaction.txid, amount);
            match persist_payment(storage, transaction, address, amount, description).await? {
                // only new rows are reported back
                Persisted::Created(payment) => created.push(payment),
                Persisted::AlreadyExists(existing) => {
                    debug!(txid = %existing.txid, address = %existing.address, "payment already recorded");
                }
            }
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use txsync_domain::model::{TxId, TxInput, TxOutput};
    use txsync_domain::storage::{StorageError, StorageResult};

    const TXID: &str = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";
    const TRACKED: &str = "1JDfUiJHZ6pDY6wWYTx86RYjDCW7QxCofs";
    const OTHER: &str = "1G8A6rRugWuqGpXpRKBip1DpVVUV9KtALK";

    /// In-memory payment store. With `race` set, the first insert reports a
    /// uniqueness conflict after a phantom writer has stored the row.
    #[derive(Clone, Default)]
    struct MockStorage {
        rows: Arc<Mutex<Vec<PaymentRecord>>>,
        inserts: Arc<AtomicUsize>,
        race: bool,
    }

    fn record_from(payment: NewPayment, id: i64) -> PaymentRecord {
        PaymentRecord {
            id,
            txid: payment.txid,
            address: payment.address,
            amount: payment.amount,
            description: payment.description,
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl PaymentStore for MockStorage {
        async fn find_payment(
            &self,
            txid: &TxId,
            address: &AddressId,
        ) -> StorageResult<Option<PaymentRecord>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .find(|row| &row.txid == txid && &row.address == address)
                .cloned())
        }

        async fn insert_payment(
            &self,
            payment: NewPayment,
        ) -> StorageResult<Persisted<PaymentRecord>> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            let id = rows.len() as i64 + 1;
            let record = record_from(payment, id);
            rows.push(record.clone());
            if self.race {
                return Err(StorageError::Conflict("payments.txid, payments.address".into()));
            }
            Ok(Persisted::Created(record))
        }

        async fn payments_for_transaction(
            &self,
            _txid: &TxId,
        ) -> StorageResult<Vec<PaymentRecord>> {
            Ok(Vec::new())
        }

        async fn payments_for_address(
            &self,
            _address: &AddressId,
        ) -> StorageResult<Vec<PaymentRecord>> {
            Ok(Vec::new())
        }

        async fn count_payments(&self) -> StorageResult<u64> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn tracked(address: &str) -> TrackedAddress {
        TrackedAddress {
            address: AddressId::parse(address).unwrap(),
            public_key: "pub".into(),
            private_key: None,
            description: "test".into(),
            created_at: Utc::now(),
        }
    }

    fn internal_transfer() -> TransactionRecord {
        TransactionRecord {
            seq: 1,
            transaction: Transaction {
                txid: TxId::parse(TXID).unwrap(),
                inputs: vec![TxInput {
                    value: dec("1"),
                    owner: Some(AddressId::parse(TRACKED).unwrap()),
                }],
                outputs: vec![
                    TxOutput {
                        value: dec("0.6"),
                        owner: Some(AddressId::parse(OTHER).unwrap()),
                    },
                    TxOutput {
                        value: dec("0.3999"),
                        owner: Some(AddressId::parse(TRACKED).unwrap()),
                    },
                ],
            },
            imported_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_input_does_nothing() {
        let storage = MockStorage::default();
        let created = process_payments_for(&storage, &[], &[tracked(TRACKED)])
            .await
            .expect("processing succeeds");
        assert!(created.is_empty());
        assert_eq!(storage.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn internal_transfer_yields_one_payment_per_tracked_address() {
        let storage = MockStorage::default();
        let created = process_payments_for(
            &storage,
            &[internal_transfer()],
            &[tracked(TRACKED), tracked(OTHER)],
        )
        .await
        .expect("processing succeeds");

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].address.as_str(), TRACKED);
        assert_eq!(created[0].amount, dec("-0.6001"));
        assert_eq!(created[1].address.as_str(), OTHER);
        assert_eq!(created[1].amount, dec("0.6"));
        assert_eq!(created[0].description, format!("sent 0.6001 in {TXID}"));
    }

    #[tokio::test]
    async fn reprocessing_creates_nothing_new() {
        let storage = MockStorage::default();
        let addresses = [tracked(TRACKED), tracked(TRACKED)];
        let first = process_payments_for(&storage, &[internal_transfer()], &addresses)
            .await
            .unwrap();
        let second = process_payments_for(&storage, &[internal_transfer()], &addresses)
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(storage.count_payments().await.unwrap(), 1);
        assert_eq!(storage.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persist_returns_existing_row_without_update() {
        let storage = MockStorage::default();
        let record = internal_transfer();
        let address = AddressId::parse(TRACKED).unwrap();
        persist_payment(&storage, &record.transaction, &address, dec("-0.6001"), "a".into())
            .await
            .unwrap();

        let again = persist_payment(&storage, &record.transaction, &address, dec("5"), "b".into())
            .await
            .unwrap();
        match again {
            Persisted::AlreadyExists(existing) => {
                assert_eq!(existing.amount, dec("-0.6001"));
                assert_eq!(existing.description, "a");
            }
            Persisted::Created(_) => panic!("expected existing payment"),
        }
    }

    #[tokio::test]
    async fn lost_insert_race_is_not_an_error() {
        let storage = MockStorage {
            race: true,
            ..MockStorage::default()
        };
        let record = internal_transfer();
        let address = AddressId::parse(TRACKED).unwrap();
        let outcome = persist_payment(
            &storage,
            &record.transaction,
            &address,
            dec("-0.6001"),
            "sent".into(),
        )
        .await
        .expect("conflict is recovered");
        assert!(!outcome.is_created());
    }

    #[tokio::test]
    async fn uninvolved_addresses_get_no_payment() {
        let storage = MockStorage::default();
        let created = process_payments_for(
            &storage,
            &[internal_transfer()],
            &[tracked("1BDnQ3UCwTTkL4jKLZabaiu9qd9566kJKf")],
        )
        .await
        .unwrap();
        assert!(created.is_empty());
        assert_eq!(storage.inserts.load(Ordering::SeqCst), 0);
    }
}
