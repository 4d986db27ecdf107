//! Error types for the persistence layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted row holds a value the domain model cannot represent.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// True when the failure is a backend-availability problem (busy or
    /// locked database) rather than bad data. Callers surface these as a
    /// transient outage, never as a license deny.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
