use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use txsync_domain::model::{Persisted, Transaction, TransactionRecord, TxId, TxInput, TxOutput};
use txsync_domain::storage::{StorageResult, TransactionStore};

use crate::entity::transactions;
use crate::errors::{map_db_err, StorageError};
use crate::SeaOrmStorage;

/// Shape of the `raw_data` column.
#[derive(Serialize, Deserialize)]
struct StoredLegs {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

#[async_trait::async_trait]
impl TransactionStore for SeaOrmStorage {
    async fn transaction_exists(&self, txid: &TxId) -> StorageResult<bool> {
        let count = transactions::Entity::find()
            .filter(transactions::Column::Txid.eq(txid.as_str()))
            .count(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(count > 0)
    }

    async fn insert_transaction(
        &self,
        transaction: Transaction,
    ) -> StorageResult<Persisted<TransactionRecord>> {
        let raw_data = serde_json::to_string(&StoredLegs {
            inputs: transaction.inputs,
            outputs: transaction.outputs,
        })
        .map_err(StorageError::from_source)?;

        let model = transactions::ActiveModel {
            txid: Set(transaction.txid.as_str().to_owned()),
            raw_data: Set(raw_data),
            imported_at: Set(Utc::now()),
            ..Default::default()
        };
        let inserted = transactions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(transactions::Column::Txid)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(map_db_err);

        let created = match inserted {
            Ok(rows) => rows > 0,
            Err(StorageError::Conflict(_)) => false,
            Err(err) => return Err(err),
        };

        let record = self
            .find_transaction(&transaction.txid)
            .await?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "transaction {} missing after insert",
                    transaction.txid
                ))
            })?;

        Ok(if created {
            Persisted::Created(record)
        } else {
            Persisted::AlreadyExists(record)
        })
    }

    async fn find_transaction(&self, txid: &TxId) -> StorageResult<Option<TransactionRecord>> {
        let maybe = transactions::Entity::find()
            .filter(transactions::Column::Txid.eq(txid.as_str()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(transaction_to_record).transpose()
    }

    async fn all_transactions(&self) -> StorageResult<Vec<TransactionRecord>> {
        transactions::Entity::find()
            .order_by_asc(transactions::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(transaction_to_record)
            .collect()
    }

    async fn transactions_after(
        &self,
        after_seq: i64,
        limit: u64,
    ) -> StorageResult<Vec<TransactionRecord>> {
        transactions::Entity::find()
            .filter(transactions::Column::Id.gt(after_seq))
            .order_by_asc(transactions::Column::Id)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(transaction_to_record)
            .collect()
    }

    async fn count_transactions(&self) -> StorageResult<u64> {
        transactions::Entity::find()
            .count(self.connection())
            .await
            .map_err(StorageError::from_source)
    }
}

fn transaction_to_record(model: transactions::Model) -> StorageResult<TransactionRecord> {
    let txid = TxId::parse(&model.txid).map_err(|err| StorageError::Database(err.to_string()))?;
    let legs: StoredLegs =
        serde_json::from_str(&model.raw_data).map_err(StorageError::from_source)?;

    Ok(TransactionRecord {
        seq: i64::from(model.id),
        transaction: Transaction {
            txid,
            inputs: legs.inputs,
            outputs: legs.outputs,
        },
        imported_at: model.imported_at,
    })
}
