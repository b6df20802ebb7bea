//! Store error model.

use conveyor_core::JobId;
use thiserror::Error;

/// Failure of a store operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced job does not exist (or no longer exists).
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A persisted row could not be decoded into a [`conveyor_core::Job`].
    #[error("corrupt job row: {0}")]
    CorruptRow(String),

    /// The storage engine failed; the message carries the operation context.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Map an sqlx error into a [`StoreError`], tagging the failing operation.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}
