use sea_orm::sea_query::{
    ColumnDef, Expr, ForeignKey, Index, IndexCreateStatement, Table, TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{payments, tracked_addresses, transactions};
use crate::errors::StorageError;
use txsync_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let addresses_table = Table::create()
        .table(tracked_addresses::Entity)
        .col(
            ColumnDef::new(tracked_addresses::Column::Address)
                .string_len(128)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(tracked_addresses::Column::PublicKey)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(tracked_addresses::Column::PrivateKey)
                .string()
                .null(),
        )
        .col(
            ColumnDef::new(tracked_addresses::Column::Description)
                .text()
                .not_null(),
        )
        .col(
            ColumnDef::new(tracked_addresses::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, addresses_table).await?;

    let transactions_table = Table::create()
        .table(transactions::Entity)
        .col(
            ColumnDef::new(transactions::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(transactions::Column::Txid)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(transactions::Column::RawData)
                .text()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ImportedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, transactions_table).await?;

    let payments_table = Table::create()
        .table(payments::Entity)
        .col(
            ColumnDef::new(payments::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(payments::Column::Txid)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Address)
                .string_len(128)
                .not_null(),
        )
        .col(ColumnDef::new(payments::Column::Amount).string_len(64).not_null())
        .col(ColumnDef::new(payments::Column::Description).text().not_null())
        .col(
            ColumnDef::new(payments::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        // a payment belongs to exactly one stored transaction and one tracked address
        .foreign_key(
            ForeignKey::create()
                .name("fk_payments_txid")
                .from(payments::Entity, payments::Column::Txid)
                .to(transactions::Entity, transactions::Column::Txid),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_payments_address")
                .from(payments::Entity, payments::Column::Address)
                .to(tracked_addresses::Entity, tracked_addresses::Column::Address),
        )
        .to_owned();
    create_table(db, backend, payments_table).await?;

    // one payment per (transaction, address); the persister relies on it
    let payment_pair_index = Index::create()
        .name("idx_payments_txid_address")
        .table(payments::Entity)
        .col(payments::Column::Txid)
        .col(payments::Column::Address)
        .unique()
        .to_owned();
    create_index(db, backend, payment_pair_index).await?;

    let payment_address_index = Index::create()
        .name("idx_payments_address")
        .table(payments::Entity)
        .col(payments::Column::Address)
        .to_owned();
    create_index(db, backend, payment_address_index).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
