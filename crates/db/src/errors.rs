//! Errors shared by all storage backends.

use thiserror::Error;

use crate::{inmemory::errors::InMemoryError, persistent::errors::StorageError};

/// Errors that can occur while reading or writing dispute data.
#[derive(Debug, Error)]
pub enum DbError {
    /// The SQLite backend failed.
    #[error("sqlite: {0}")]
    Storage(#[from] StorageError),

    /// The in-memory backend failed.
    #[error("memory: {0}")]
    InMemory(#[from] InMemoryError),
}

/// Wrapper type for results that can fail with a [`DbError`].
pub type DbResult<T> = Result<T, DbError>;
