//! Corpus ingestion: chunking, embedding, document/image analysis, and
//! GitHub repository loading.
//!
//! This crate turns raw sources (uploaded files, URLs, cloned repos) into
//! the [`chunker::Chunk`] units the Knowledge Store consumes.

pub mod chunker;
pub mod document_analyzer;
pub mod embedder;
pub mod error;
pub mod git_loader;

pub use chunker::{chunk_text, Chunk, Granularity};
pub use document_analyzer::DocumentAnalyzer;
pub use embedder::{Embedder, NullEmbedder, RemoteEmbedder};
pub use error::{IngestError, Result};
pub use git_loader::{ClassifiedFiles, GitLoader};
