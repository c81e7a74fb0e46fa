//! Persistent database errors.

use thiserror::Error;

/// Errors that can occur when interacting with the database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An error occurred when interacting with the SQLite database.
    #[error("sqlite: {0}")]
    Driver(#[from] sqlx::Error),

    /// A stored value could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error occurred when converting between types.
    #[error("conversion: {0}")]
    MismatchedTypes(String),

    /// An error occurred when validating data.
    #[error("data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Driver(
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Database(_)
            )
        )
    }
}
