use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use txsync_domain::model::{AddressId, NewPayment, PaymentRecord, Persisted, TxId};
use txsync_domain::storage::{PaymentStore, StorageResult};

use crate::entity::payments;
use crate::errors::{map_db_err, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl PaymentStore for SeaOrmStorage {
    async fn find_payment(
        &self,
        txid: &TxId,
        address: &AddressId,
    ) -> StorageResult<Option<PaymentRecord>> {
        let maybe = payments::Entity::find()
            .filter(payments::Column::Txid.eq(txid.as_str()))
            .filter(payments::Column::Address.eq(address.as_str()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(payment_to_record).transpose()
    }

    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<Persisted<PaymentRecord>> {
        let model = payments::ActiveModel {
            txid: Set(payment.txid.as_str().to_owned()),
            address: Set(payment.address.as_str().to_owned()),
            amount: Set(payment.amount.normalize().to_string()),
            description: Set(payment.description),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let inserted = payments::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([payments::Column::Txid, payments::Column::Address])
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
            .find_payment(&payment.txid, &payment.address)
            .await?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "payment {}/{} missing after insert",
                    payment.txid, payment.address
                ))
            })?;

        Ok(if created {
            Persisted::Created(record)
        } else {
            Persisted::AlreadyExists(record)
        })
    }

    async fn payments_for_transaction(&self, txid: &TxId) -> StorageResult<Vec<PaymentRecord>> {
        payments::Entity::find()
            .filter(payments::Column::Txid.eq(txid.as_str()))
            .order_by_asc(payments::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(payment_to_record)
            .collect()
    }

    async fn payments_for_address(
        &self,
        address: &AddressId,
    ) -> StorageResult<Vec<PaymentRecord>> {
        payments::Entity::find()
            .filter(payments::Column::Address.eq(address.as_str()))
            .order_by_asc(payments::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(payment_to_record)
            .collect()
    }

    async fn count_payments(&self) -> StorageResult<u64> {
        payments::Entity::find()
            .count(self.connection())
            .await
            .map_err(StorageError::from_source)
    }
}

fn payment_to_record(model: payments::Model) -> StorageResult<PaymentRecord> {
    let txid = TxId::parse(&model.txid).map_err(|err| StorageError::Database(err.to_string()))?;
    let address =
        AddressId::parse(&model.address).map_err(|err| StorageError::Database(err.to_string()))?;
    let amount = Decimal::from_str(&model.amount).map_err(StorageError::from_source)?;

    Ok(PaymentRecord {
        id: i64::from(model.id),
        txid,
        address,
        amount,
        description: model.description,
        created_at: model.created_at,
    })
}
