//! Error types for the SQLite executor

use gist_core::GistError;
use thiserror::Error;

/// SQLite executor error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query preparation or execution error
    #[error("Query error: {0}")]
    Query(String),

    /// DDL generation or application error
    #[error("Schema error: {0}")]
    Schema(String),

    /// A stored value does not fit the expected column kind
    #[error("Decode error: {0}")]
    Decode(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<SqliteError> for GistError {
    fn from(err: SqliteError) -> Self {
        GistError::Execution(err.to_string())
    }
}
