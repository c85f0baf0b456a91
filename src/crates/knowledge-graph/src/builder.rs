//! Hierarchical Graph Builder: the four-stage Backbone → Intermediate →
//! Drilldown → Optimize pipeline.
//!
//! Bounded concurrency follows the teacher's `orca::executor::task_executor`
//! timeout-wrapped-task shape, substituting a `Semaphore`-gated `JoinSet`
//! for per-worker fan-out since this pipeline has no workflow-graph router
//! to dispatch through. Per-task failures are logged and skipped, never
//! propagated, per spec.md's Transient error kind.

use crate::error::Result;
use crate::model::{NodeType, GLOBAL_SUMMARY};
use crate::store::KnowledgeStore;
use ingest::chunker::{Chunk, Granularity};
use ingest::embedder::Embedder;
use llm::{LlmClient, Message};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vector_index::{DedupKey, VectorIndex};

const DEFAULT_WORKER_POOL: usize = 8;
const DRILLDOWN_TOP_K: usize = 10;
const DRILLDOWN_CHUNK_SEARCH_K: usize = 50;
const OPTIMIZE_MAX_ITERATIONS: usize = 3;
const BACKBONE_EDGE_SAMPLE: usize = 100;

/// Configuration knobs for a build run.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub worker_pool: usize,
    pub drilldown_top_k: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { worker_pool: DEFAULT_WORKER_POOL, drilldown_top_k: DRILLDOWN_TOP_K }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedNode {
    id: String,
    description: String,
    #[serde(default)]
    importance: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractedEdge {
    src: String,
    dst: String,
    description: String,
    #[serde(default = "default_weight")]
    weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Deserialize, Default)]
struct ExtractionResponse {
    #[serde(default)]
    nodes: Vec<ExtractedNode>,
    #[serde(default)]
    edges: Vec<ExtractedEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
enum OptimizeOp {
    Delete { target: String },
    Merge { source: String, target: String },
    Connect { src: String, dst: String, description: String, #[serde(default = "default_connect_weight")] weight: f32 },
}

fn default_connect_weight() -> f32 {
    2.0
}

#[derive(Debug, Deserialize, Default)]
struct OptimizeResponse {
    #[serde(default)]
    operations: Vec<OptimizeOp>,
}

/// Orchestrates the four ingestion stages over a [`KnowledgeStore`].
pub struct GraphBuilder {
    client: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    config: BuilderConfig,
}

impl GraphBuilder {
    pub fn new(client: Arc<dyn LlmClient>, embedder: Arc<dyn Embedder>, config: BuilderConfig) -> Self {
        Self { client, embedder, config }
    }

    /// Run all four stages against a freshly-chunked corpus. `small_chunk_index`
    /// must already contain every small chunk's vector (caller-embedded, per
    /// the same layering split documented on `ExperienceMemory`).
    pub async fn build(
        &self,
        store: &KnowledgeStore,
        user_intent: &str,
        big_chunks: &[Chunk],
        small_chunk_index: &VectorIndex,
        repo_tree: Option<&str>,
    ) -> Result<()> {
        let full_document = big_chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let backbone_ids = self.stage1_backbone(store, user_intent, &full_document, repo_tree).await?;
        self.stage2_intermediate(store, user_intent, &backbone_ids, big_chunks).await;
        self.stage3_drilldown(store, small_chunk_index).await;
        self.stage4_optimize(store).await;
        Ok(())
    }

    /// Stage 1 — pass the whole document to the long-context LLM once and
    /// extract 10-20 backbone nodes/edges, tagged `backbone` and attributed
    /// to the `global_summary` sentinel.
    async fn stage1_backbone(
        &self,
        store: &KnowledgeStore,
        user_intent: &str,
        full_document: &str,
        repo_tree: Option<&str>,
    ) -> Result<Vec<String>> {
        let tree_section = repo_tree.map(|t| format!("\n\nRepository layout:\n{}", t)).unwrap_or_default();
        let prompt = format!(
            "User intent: {}\n\nExtract 10 to 20 top-level architectural entities (nodes) and the relationships \
             (edges) between them from the document below. Respond as JSON: {{\"nodes\": [{{\"id\", \"description\", \
             \"importance\"}}], \"edges\": [{{\"src\", \"dst\", \"description\", \"weight\"}}]}}.{}\n\nDocument:\n{}",
            user_intent, tree_section, full_document
        );

        let response = self.client.chat(&[Message::human(prompt)], Some(BACKBONE_SYSTEM_PROMPT), true).await;
        let extracted = match response {
            Ok(text) => parse_extraction(&text),
            Err(e) => {
                warn!(error = %e, "backbone extraction call failed");
                ExtractionResponse::default()
            }
        };

        let mut ids = Vec::with_capacity(extracted.nodes.len());
        for node in &extracted.nodes {
            store.upsert_node(&node.id, &node.description, NodeType::Backbone, GLOBAL_SUMMARY, 5.0 + node.importance);
            ids.push(node.id.clone());
        }
        for edge in &extracted.edges {
            store.upsert_edge(&edge.src, &edge.dst, &edge.description, GLOBAL_SUMMARY, edge.weight);
        }

        info!(backbone_nodes = ids.len(), "stage 1 backbone extraction complete");
        Ok(ids)
    }

    /// Stage 2 — enrich in parallel over big chunks, anchored on the
    /// backbone node IDs. Bounded to `config.worker_pool` concurrent calls.
    async fn stage2_intermediate(&self, store: &KnowledgeStore, user_intent: &str, backbone_ids: &[String], big_chunks: &[Chunk]) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool));
        let mut tasks = JoinSet::new();

        for chunk in big_chunks.iter().filter(|c| c.granularity == Granularity::Big) {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let user_intent = user_intent.to_string();
            let anchors = backbone_ids.to_vec();
            let chunk_id = chunk.id.clone();
            let chunk_text = chunk.text.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let prompt = format!(
                    "User intent: {}\n\nAnchor context (existing backbone entities): {}\n\nExtract new entities and \
                     relationships from the chunk below, prioritizing connections to the anchor entities. Respond as \
                     JSON: {{\"nodes\": [...], \"edges\": [...]}} in the same shape as before.\n\nChunk:\n{}",
                    user_intent,
                    anchors.join(", "),
                    chunk_text
                );
                let result = client.chat(&[Message::human(prompt)], Some(INTERMEDIATE_SYSTEM_PROMPT), true).await;
                (chunk_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (chunk_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "stage 2 worker task panicked, skipping");
                    continue;
                }
            };
            let extracted = match result {
                Ok(text) => parse_extraction(&text),
                Err(e) => {
                    warn!(chunk_id = %chunk_id, error = %e, "stage 2 extraction call failed, skipping chunk");
                    continue;
                }
            };
            apply_extraction(store, &extracted, NodeType::Intermediate, &chunk_id, 5.0);
        }
    }

    /// Stage 3 — rank nodes by (importance, degree), drill down into the
    /// top-K with small-chunk vector search, deduping chunk visits globally.
    async fn stage3_drilldown(&self, store: &KnowledgeStore, small_chunk_index: &VectorIndex) {
        let mut ranked: Vec<(String, f32, usize)> =
            store.all_nodes().into_iter().map(|n| (n.id.clone(), n.importance, store.degree(&n.id))).collect();
        ranked.sort_by(|a, b| (b.1, b.2).partial_cmp(&(a.1, a.2)).unwrap_or(std::cmp::Ordering::Equal));
        let focus_nodes: Vec<(String, String)> = ranked
            .into_iter()
            .take(self.config.drilldown_top_k)
            .filter_map(|(id, ..)| store.node(&id).map(|n| (id, n.description)))
            .collect();

        let queries: Vec<String> = focus_nodes.iter().map(|(id, desc)| format!("{}: {}", id, desc)).collect();
        let query_vectors = match self.embedder.encode(&queries).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, "stage 3 query embedding failed, skipping drilldown");
                return;
            }
        };

        let visited_chunks: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool));
        let mut tasks = JoinSet::new();

        for ((focus_id, focus_desc), query_vector) in focus_nodes.into_iter().zip(query_vectors) {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let visited_chunks = visited_chunks.clone();

            let hits = small_chunk_index
                .query(&query_vector, DRILLDOWN_CHUNK_SEARCH_K, 3, DedupKey::ByPayloadHash, None)
                .unwrap_or_default();

            let new_chunk_hits: Vec<(String, String)> = {
                let mut guard = visited_chunks.lock().expect("visited_chunks poisoned");
                hits.into_iter()
                    .filter_map(|hit| {
                        if guard.insert(hit.id.clone()) {
                            Some((hit.id, hit.payload))
                        } else {
                            None
                        }
                    })
                    .collect()
            };

            for (chunk_id, chunk_text) in new_chunk_hits {
                let client = client.clone();
                let semaphore = semaphore.clone();
                let focus_id = focus_id.clone();
                let focus_desc = focus_desc.clone();

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let prompt = format!(
                        "Focus entity: {} ({})\n\nExtract relationships primarily involving the focus entity (plus \
                         any other dense, high-value relationships) from the chunk below. Respond as JSON: \
                         {{\"nodes\": [...], \"edges\": [...]}}.\n\nChunk:\n{}",
                        focus_id, focus_desc, chunk_text
                    );
                    let result = client.chat(&[Message::human(prompt)], Some(DRILLDOWN_SYSTEM_PROMPT), true).await;
                    (chunk_id, result)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (chunk_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "stage 3 worker task panicked, skipping");
                    continue;
                }
            };
            let extracted = match result {
                Ok(text) => parse_extraction(&text),
                Err(e) => {
                    warn!(chunk_id = %chunk_id, error = %e, "stage 3 extraction call failed, skipping chunk");
                    continue;
                }
            };
            apply_extraction(store, &extracted, NodeType::Derived, &chunk_id, 1.0);
        }
    }

    /// Stage 4 — backbone-preserving optimization, up to
    /// [`OPTIMIZE_MAX_ITERATIONS`] rounds.
    async fn stage4_optimize(&self, store: &KnowledgeStore) {
        for iteration in 0..OPTIMIZE_MAX_ITERATIONS {
            let components = store.weakly_connected_components();
            if components.len() <= 1 {
                break;
            }

            let backbone = components.iter().max_by_key(|c| c.len()).cloned().unwrap_or_default();
            let fragments: Vec<_> = components.into_iter().filter(|c| c != &backbone).collect();

            let (_, backbone_edges) = store.subgraph(&backbone);
            let mut sample: Vec<_> = backbone_edges;
            sample.sort_by(|a, b| {
                let score = |e: &crate::model::Edge| {
                    store.node(&e.src).map(|n| n.importance).unwrap_or(0.0)
                        + store.node(&e.dst).map(|n| n.importance).unwrap_or(0.0)
                };
                score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
            });
            sample.truncate(BACKBONE_EDGE_SAMPLE);

            let fragment_ids: HashSet<String> = fragments.iter().flatten().cloned().collect();
            let (fragment_nodes, fragment_edges) = store.subgraph(&fragment_ids);

            let prompt = format!(
                "Iteration {}: decide how to reconcile disconnected graph fragments with the main backbone.\n\n\
                 Backbone edge sample: {:?}\n\nFragment nodes: {:?}\n\nFragment edges: {:?}\n\n\
                 Respond as JSON: {{\"operations\": [{{\"kind\": \"DELETE\"|\"MERGE\"|\"CONNECT\", ...}}]}}, at most 20 operations.",
                iteration,
                sample.iter().map(|e| &e.description).collect::<Vec<_>>(),
                fragment_nodes.iter().map(|n| (&n.id, &n.description)).collect::<Vec<_>>(),
                fragment_edges.iter().map(|e| &e.description).collect::<Vec<_>>()
            );

            let response = self.client.chat(&[Message::human(prompt)], Some(OPTIMIZE_SYSTEM_PROMPT), true).await;
            let operations = match response {
                Ok(text) => parse_optimize(&text),
                Err(e) => {
                    warn!(error = %e, "optimization call failed, stopping early");
                    break;
                }
            };

            if operations.is_empty() {
                break;
            }

            for op in operations.into_iter().take(20) {
                apply_optimize_op(store, op, &backbone);
            }
        }

        let residual = store.isolates();
        if !residual.is_empty() {
            store.remove_nodes(&residual);
        }
    }
}

const BACKBONE_SYSTEM_PROMPT: &str =
    "You extract a high-level architectural knowledge graph from a technical document. Output strict JSON only.";
const INTERMEDIATE_SYSTEM_PROMPT: &str =
    "You enrich a knowledge graph with mid-level entities and relationships, anchored to known top-level entities. Output strict JSON only.";
const DRILLDOWN_SYSTEM_PROMPT: &str =
    "You extract fine-grained relationships for a specific focus entity from a text passage. Output strict JSON only.";
const OPTIMIZE_SYSTEM_PROMPT: &str =
    "You reconcile disconnected graph fragments with a backbone graph via DELETE, MERGE, and CONNECT operations. Output strict JSON only.";

fn parse_extraction(text: &str) -> ExtractionResponse {
    tooling::json_repair::extract_json_object(text)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn parse_optimize(text: &str) -> Vec<OptimizeOp> {
    tooling::json_repair::extract_json_object(text)
        .ok()
        .and_then(|v| serde_json::from_value::<OptimizeResponse>(v).ok())
        .map(|r| r.operations)
        .unwrap_or_default()
}

fn apply_extraction(store: &KnowledgeStore, extracted: &ExtractionResponse, node_type: NodeType, chunk_id: &str, boost: f32) {
    for node in &extracted.nodes {
        store.upsert_node(&node.id, &node.description, node_type, chunk_id, boost + node.importance);
    }
    for edge in &extracted.edges {
        store.upsert_edge(&edge.src, &edge.dst, &edge.description, chunk_id, edge.weight);
    }
}

fn apply_optimize_op(store: &KnowledgeStore, op: OptimizeOp, backbone: &HashSet<String>) {
    match op {
        OptimizeOp::Delete { target } => {
            if !backbone.contains(&target) {
                store.remove_nodes(&[target]);
            }
        }
        OptimizeOp::Merge { source, target } => {
            let _ = store.merge_node(&source, &target);
        }
        OptimizeOp::Connect { src, dst, description, weight } => {
            store.upsert_edge(&src, &dst, &description, GLOBAL_SUMMARY, weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_recovers_from_prose_wrapped_json() {
        let text = "Here you go:\n```json\n{\"nodes\": [{\"id\": \"a\", \"description\": \"x\"}], \"edges\": []}\n```";
        let parsed = parse_extraction(text);
        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(parsed.nodes[0].id, "a");
    }

    #[test]
    fn test_parse_extraction_defaults_on_malformed_json() {
        let parsed = parse_extraction("not json at all");
        assert!(parsed.nodes.is_empty());
        assert!(parsed.edges.is_empty());
    }

    #[test]
    fn test_apply_extraction_tags_node_type_and_boost() {
        let store = KnowledgeStore::new();
        let extracted = ExtractionResponse {
            nodes: vec![ExtractedNode { id: "n1".into(), description: "desc".into(), importance: 0.5 }],
            edges: vec![],
        };
        apply_extraction(&store, &extracted, NodeType::Intermediate, "chunk_1", 5.0);
        let node = store.node("n1").unwrap();
        assert_eq!(node.node_type, NodeType::Intermediate);
        assert_eq!(node.importance, 5.5);
    }

    #[test]
    fn test_optimize_delete_ignored_inside_backbone() {
        let store = KnowledgeStore::new();
        store.upsert_node("b1", "core", NodeType::Backbone, GLOBAL_SUMMARY, 5.0);
        let backbone: HashSet<String> = ["b1".to_string()].into_iter().collect();

        apply_optimize_op(&store, OptimizeOp::Delete { target: "b1".to_string() }, &backbone);

        assert!(store.node("b1").is_some());
    }

    #[test]
    fn test_optimize_connect_adds_edge() {
        let store = KnowledgeStore::new();
        let backbone: HashSet<String> = HashSet::new();
        apply_optimize_op(
            &store,
            OptimizeOp::Connect { src: "x".into(), dst: "y".into(), description: "linked".into(), weight: 2.0 },
            &backbone,
        );
        assert_eq!(store.out_neighbors("x").len(), 1);
    }
}
