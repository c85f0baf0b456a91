//! Graph-first retrieval: anchor selection → 1-hop expansion → chunk
//! voting → deterministic context assembly.

use crate::error::{GraphError, Result};
use crate::model::GLOBAL_SUMMARY;
use crate::store::KnowledgeStore;
use ingest::embedder::Embedder;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const ANCHOR_THRESHOLD: f32 = 0.35;
const ANCHOR_TOP_K: usize = 5;
const MAX_EDGE_DESCRIPTIONS: usize = 15;
const MAX_OTHER_ENTITY_HITS: usize = 5;

/// Assembled retrieval context, ready to be spliced into a downstream
/// Code Generator prompt.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub anchors: Vec<AnchorHit>,
    pub edge_descriptions: Vec<String>,
    pub chunks: Vec<ChunkSection>,
}

#[derive(Debug, Clone)]
pub struct AnchorHit {
    pub id: String,
    pub description: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ChunkSection {
    pub chunk_id: String,
    pub anchor_hits: Vec<String>,
    pub other_hits: Vec<String>,
    pub text: String,
}

impl RetrievalContext {
    /// The sentinel returned when no anchors clear the similarity
    /// threshold — retrieval succeeded but found nothing relevant.
    pub fn empty() -> String {
        "No relevant context was found in the knowledge graph for this query.".to_string()
    }

    /// Render into the deterministic Section A / B / C text block.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("## Anchor definitions\n");
        for anchor in &self.anchors {
            out.push_str(&format!("- {} (confidence {:.2}): {}\n", anchor.id, anchor.confidence, anchor.description));
        }

        out.push_str("\n## Relationships\n");
        for description in &self.edge_descriptions {
            out.push_str(&format!("- {}\n", description));
        }

        out.push_str("\n## Source passages\n");
        for chunk in &self.chunks {
            out.push_str(&format!(
                "### Chunk {}\nAnchors: {}\nOther entities: {}\n\n{}\n\n",
                chunk.chunk_id,
                chunk.anchor_hits.join(", "),
                chunk.other_hits.join(", "),
                chunk.text
            ));
        }

        out
    }
}

/// Looks up chunk text given a chunk id, so the retriever doesn't need to
/// hold a reference to the whole small-chunk corpus itself.
pub trait ChunkLookup: Send + Sync {
    fn text_of(&self, chunk_id: &str) -> Option<String>;
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Run the full anchor → expansion → voting → assembly pipeline for
    /// `query`, selecting at most `top_k_chunks` source passages.
    pub async fn retrieve(
        &self,
        store: &KnowledgeStore,
        query: &str,
        top_k_chunks: usize,
        chunks: &dyn ChunkLookup,
    ) -> Result<String> {
        if store.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let anchors = self.select_anchors(store, query).await?;
        if anchors.is_empty() {
            return Ok(RetrievalContext::empty());
        }

        let (subgraph_nodes, subgraph_edges) = self.expand_one_hop(store, &anchors);
        let anchor_ids: HashSet<String> = anchors.iter().map(|a| a.id.clone()).collect();

        let votes = self.vote_chunks(store, &subgraph_nodes, &anchor_ids);
        let mut ranked_chunks: Vec<(&String, &f32)> = votes.iter().collect();
        ranked_chunks.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked_chunks.truncate(top_k_chunks);

        let mut edge_descriptions: Vec<String> = subgraph_edges.iter().map(|e| e.description.clone()).collect();
        edge_descriptions.sort_by_key(|d| std::cmp::Reverse(d.len()));
        edge_descriptions.truncate(MAX_EDGE_DESCRIPTIONS);

        let chunk_sections = ranked_chunks
            .into_iter()
            .filter_map(|(chunk_id, _)| {
                let text = chunks.text_of(chunk_id)?;
                let (anchor_hits, other_hits) = self.entity_hits_for_chunk(store, chunk_id, &anchor_ids);
                Some(ChunkSection { chunk_id: chunk_id.clone(), anchor_hits, other_hits, text })
            })
            .collect();

        Ok(RetrievalContext { anchors, edge_descriptions, chunks: chunk_sections }.render())
    }

    async fn select_anchors(&self, store: &KnowledgeStore, query: &str) -> Result<Vec<AnchorHit>> {
        let query_vector = self
            .embedder
            .encode(&[query.to_string()])
            .await
            .map_err(|e| GraphError::BackendUnavailable(e.to_string()))?
            .pop()
            .unwrap_or_default();

        let node_texts: Vec<String> = store.all_nodes().iter().map(|n| format!("{}: {}", n.id, n.description)).collect();
        let node_vectors = self
            .embedder
            .encode(&node_texts)
            .await
            .map_err(|e| GraphError::BackendUnavailable(e.to_string()))?;

        let mut scored: Vec<AnchorHit> = store
            .all_nodes()
            .into_iter()
            .zip(node_vectors)
            .map(|(node, vector)| AnchorHit { id: node.id, description: node.description, confidence: cosine_similarity(&query_vector, &vector) })
            .filter(|hit| hit.confidence >= ANCHOR_THRESHOLD)
            .collect();

        scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(ANCHOR_TOP_K);
        Ok(scored)
    }

    fn expand_one_hop(&self, store: &KnowledgeStore, anchors: &[AnchorHit]) -> (HashSet<String>, Vec<crate::model::Edge>) {
        let mut nodes: HashSet<String> = anchors.iter().map(|a| a.id.clone()).collect();
        let mut edges = Vec::new();

        for anchor in anchors {
            for edge in store.out_neighbors(&anchor.id) {
                nodes.insert(edge.dst.clone());
                edges.push(edge);
            }
            for edge in store.in_neighbors(&anchor.id) {
                nodes.insert(edge.src.clone());
                edges.push(edge);
            }
        }

        (nodes, edges)
    }

    fn vote_chunks(&self, store: &KnowledgeStore, subgraph_nodes: &HashSet<String>, anchor_ids: &HashSet<String>) -> HashMap<String, f32> {
        let mut votes: HashMap<String, f32> = HashMap::new();

        for node_id in subgraph_nodes {
            let Some(node) = store.node(node_id) else { continue };
            let is_anchor = anchor_ids.contains(node_id);

            for chunk_id in &node.source_chunks {
                if chunk_id == GLOBAL_SUMMARY {
                    continue;
                }
                let granularity_bonus = if chunk_id.starts_with("small_") {
                    1.5
                } else if chunk_id.starts_with("big_") {
                    0.5
                } else {
                    0.0
                };
                let score = 1.0 + if is_anchor { 2.0 } else { 0.0 } + granularity_bonus;
                *votes.entry(chunk_id.clone()).or_insert(0.0) += score;
            }
        }

        votes
    }

    fn entity_hits_for_chunk(&self, store: &KnowledgeStore, chunk_id: &str, anchor_ids: &HashSet<String>) -> (Vec<String>, Vec<String>) {
        let mut anchor_hits = Vec::new();
        let mut other_hits = Vec::new();

        for node in store.all_nodes() {
            if !node.source_chunks.contains(chunk_id) {
                continue;
            }
            if anchor_ids.contains(&node.id) {
                anchor_hits.push(node.id);
            } else if other_hits.len() < MAX_OTHER_ENTITY_HITS {
                other_hits.push(node.id);
            }
        }

        (anchor_hits, other_hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn encode(&self, texts: &[String]) -> ingest::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("core") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct StubChunks;

    impl ChunkLookup for StubChunks {
        fn text_of(&self, chunk_id: &str) -> Option<String> {
            Some(format!("text of {}", chunk_id))
        }
    }

    #[tokio::test]
    async fn test_empty_graph_errors() {
        let store = KnowledgeStore::new();
        let retriever = Retriever::new(Arc::new(StubEmbedder));
        let err = retriever.retrieve(&store, "core service", 5, &StubChunks).await.unwrap_err();
        assert!(matches!(err, GraphError::EmptyGraph));
    }

    #[tokio::test]
    async fn test_below_threshold_returns_empty_marker() {
        let store = KnowledgeStore::new();
        store.upsert_node("unrelated", "completely unrelated thing", NodeType::Derived, "small_0", 1.0);
        let retriever = Retriever::new(Arc::new(StubEmbedder));

        let result = retriever.retrieve(&store, "core service", 5, &StubChunks).await.unwrap();
        assert_eq!(result, RetrievalContext::empty());
    }

    #[tokio::test]
    async fn test_anchor_hit_assembles_context() {
        let store = KnowledgeStore::new();
        store.upsert_node("core_api", "core api gateway", NodeType::Backbone, GLOBAL_SUMMARY, 5.0);
        store.upsert_node("core_api", "core api gateway", NodeType::Backbone, "small_0", 0.0);
        store.upsert_edge("core_api", "db", "reads from", "small_0", 1.0);

        let retriever = Retriever::new(Arc::new(StubEmbedder));
        let result = retriever.retrieve(&store, "core service", 5, &StubChunks).await.unwrap();

        assert!(result.contains("core_api"));
        assert!(result.contains("reads from"));
    }
}
