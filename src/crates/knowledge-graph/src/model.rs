//! Graph data model: nodes, edges, and the snapshot shape persisted to disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel `source_chunks` attribution for nodes produced by the
/// whole-document backbone pass rather than any one chunk.
pub const GLOBAL_SUMMARY: &str = "global_summary";

/// How a node was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Backbone,
    Intermediate,
    Derived,
    Inferred,
}

/// A graph node: an entity or concept extracted from the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub description: String,
    pub node_type: NodeType,
    /// IDs of chunks this node's description was attributed to. Stored as a
    /// sorted set on disk so snapshots are diff-stable.
    pub source_chunks: BTreeSet<String>,
    pub importance: f32,
}

impl Node {
    pub fn new(id: impl Into<String>, description: impl Into<String>, node_type: NodeType) -> Self {
        Self { id: id.into(), description: description.into(), node_type, source_chunks: BTreeSet::new(), importance: 0.0 }
    }
}

/// A directed edge between two node IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub description: String,
    pub weight: f32,
    pub source_chunk_id: String,
}

/// A complete, versioned snapshot of the graph, as persisted to / loaded
/// from disk. `version` increases monotonically with every mutation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}
