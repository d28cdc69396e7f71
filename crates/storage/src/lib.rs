//! SeaORM-backed storage adapters that satisfy the domain repository traits
//! while keeping the database backend swappable (SQLite by default,
//! PostgreSQL via feature flag).

mod address_store;
mod builder;
mod entity;
mod errors;
mod migration;
mod payment_store;
mod transaction_store;

use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection};
use txsync_domain::storage::StorageResult;

pub use builder::StorageBuilder;
use errors::StorageError;
use migration::run_migrations;

/// Shared storage handle used by the HTTP API and the refresh worker.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
