//! Error type for the knowledge-graph crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Retriever ran against a graph with zero nodes.
    #[error("graph is empty")]
    EmptyGraph,

    /// Referenced node/edge does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// LLM or embedder backend unreachable or returned malformed output.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Snapshot (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure loading/saving a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
