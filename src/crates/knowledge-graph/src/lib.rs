//! Knowledge Store, hierarchical Graph Builder, and graph-first Retriever.
//!
//! This crate owns the persistent directed multigraph that the rest of the
//! pipeline is built around: [`builder::GraphBuilder`] populates it from a
//! chunked corpus, [`store::KnowledgeStore`] holds it under a single-writer
//! lock, and [`retriever::Retriever`] turns a query into assembled context
//! for the downstream Code Generator.

pub mod builder;
pub mod error;
pub mod model;
pub mod retriever;
pub mod store;

pub use builder::{BuilderConfig, GraphBuilder};
pub use error::{GraphError, Result};
pub use model::{Edge, Node, NodeType, Snapshot, GLOBAL_SUMMARY};
pub use retriever::{AnchorHit, ChunkLookup, RetrievalContext, Retriever};
pub use store::KnowledgeStore;
