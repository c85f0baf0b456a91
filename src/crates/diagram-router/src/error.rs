//! Error type for the diagram-router crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Debug, Error)]
pub enum RouterError {
    /// LLM or embedder backend unreachable or returned malformed output.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// LLM returned non-JSON where a structured blueprint was required and
    /// the lenient extractor could not recover one.
    #[error("failed to parse LLM response: {0}")]
    ParseFailure(String),

    /// Requested diagram type is not in the supported template set.
    #[error("unsupported diagram type: {0}")]
    UnsupportedTemplate(String),

    #[error("{0}")]
    Other(String),
}

impl From<llm::LlmError> for RouterError {
    fn from(e: llm::LlmError) -> Self {
        RouterError::BackendUnavailable(e.to_string())
    }
}
