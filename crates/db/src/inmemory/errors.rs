//! Errors of the in-memory backend.

use thiserror::Error;

/// Errors that can occur in the in-memory backend.
#[derive(Debug, Error)]
pub enum InMemoryError {
    /// The requested entry does not exist.
    #[error("could not find entry")]
    NotFound,

    /// Stored templates no longer form a valid graph.
    #[error("corrupt templates: {0}")]
    Corrupt(String),
}
