//! Error type for the vector-index crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorIndexError>;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// A query or insert vector's dimension didn't match the index's.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Lookup by id found nothing.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization of a persisted index failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure while loading or saving an index snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
