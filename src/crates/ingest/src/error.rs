//! Error type for the ingest crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Chunker received empty input text.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedding backend failed to initialize.
    #[error("embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A document/image/repo source could not be read.
    #[error("failed to read source: {0}")]
    SourceUnreadable(String),

    /// HTTP request to a remote backend failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invoking an external process (e.g. `git`) failed.
    #[error("process execution failed: {0}")]
    Process(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM call (document summarization) failed.
    #[error("LLM error: {0}")]
    Llm(#[from] llm::LlmError),

    #[error("{0}")]
    Other(String),
}
