//! Structured-store error types

use thiserror::Error;

/// Structured-store errors
#[derive(Debug, Error)]
pub enum SqlStoreError {
    /// SQLite error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Savepoint operation on a read-only connection
    #[error("connection is read-only")]
    ReadOnly,

    /// Savepoint name is not on the connection's savepoint stack
    #[error("unknown savepoint: {0}")]
    UnknownSavepoint(String),

    /// Savepoint name is already on the stack
    #[error("duplicate savepoint: {0}")]
    DuplicateSavepoint(String),

    /// Database was committed past the requested recovery point
    #[error("database committed at {committed}, ahead of recovery point {requested}")]
    RecoveryPointAhead {
        /// Recovery point recorded by the last commit
        committed: u64,
        /// Recovery point the connection was opened against
        requested: u64,
    },
}

/// Result type for structured-store operations
pub type SqlStoreResult<T> = Result<T, SqlStoreError>;
