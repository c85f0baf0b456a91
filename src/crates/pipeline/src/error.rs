//! Error type for the pipeline crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Empty text, unknown file source, or an illegal workspace name
    /// (allowed characters: `[A-Za-z0-9_-]+`).
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Missing file/record/task.
    #[error("not found: {0}")]
    NotFound(String),

    /// LLM/embedder/validator unreachable or returned malformed JSON.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Workspace already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<knowledge_graph::GraphError> for PipelineError {
    fn from(e: knowledge_graph::GraphError) -> Self {
        PipelineError::BackendUnavailable(e.to_string())
    }
}

impl From<diagram_router::RouterError> for PipelineError {
    fn from(e: diagram_router::RouterError) -> Self {
        PipelineError::BackendUnavailable(e.to_string())
    }
}

impl From<ingest::IngestError> for PipelineError {
    fn from(e: ingest::IngestError) -> Self {
        PipelineError::BackendUnavailable(e.to_string())
    }
}
