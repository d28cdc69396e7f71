use sea_orm::{DbErr, SqlErr};

pub use txsync_domain::storage::StorageError;

/// Maps unique-constraint violations to `Conflict` so callers can treat them
/// as "already exists"; everything else is a database failure.
pub(crate) fn map_db_err(err: DbErr) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StorageError::Conflict(detail),
        _ => StorageError::from_source(err),
    }
}
