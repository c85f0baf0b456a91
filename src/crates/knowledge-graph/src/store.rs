//! Thread-safe directed multigraph with provenance-merging upserts.
//!
//! Grounded on the single-writer-lock / shared-reader shape of the
//! teacher's `orca::db` repository layer, adapted from a SQL-backed store
//! to an in-memory `RwLock`-guarded graph with JSON snapshot I/O (mirroring
//! `vector-index::index::VectorIndex`'s own save/load convention).

use crate::error::{GraphError, Result};
use crate::model::{Edge, Node, NodeType, Snapshot, GLOBAL_SUMMARY};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

struct Inner {
    nodes: HashMap<String, Node>,
    /// Adjacency as parallel out/in edge lists keyed by node id, to make
    /// weakly-connected-component traversal and 1-hop expansion cheap.
    out_edges: HashMap<String, Vec<Edge>>,
    in_edges: HashMap<String, Vec<Edge>>,
}

/// The Knowledge Store: every mutating operation takes the exclusive lock
/// and bumps `version`; readers may take a shared snapshot at any time.
pub struct KnowledgeStore {
    inner: RwLock<Inner>,
    version: AtomicU64,
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { nodes: HashMap::new(), out_edges: HashMap::new(), in_edges: HashMap::new() }),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.inner.read().nodes.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn upsert_node(
        &self,
        id: &str,
        description: &str,
        node_type: NodeType,
        chunk_id: &str,
        importance_boost: f32,
    ) {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(id) {
            Some(existing) => {
                if description.len() > existing.description.len() {
                    existing.description = description.to_string();
                }
                if chunk_id != GLOBAL_SUMMARY {
                    existing.source_chunks.insert(chunk_id.to_string());
                }
                existing.importance += importance_boost;
            }
            None => {
                let mut node = Node::new(id, description, node_type);
                if chunk_id != GLOBAL_SUMMARY {
                    node.source_chunks.insert(chunk_id.to_string());
                }
                node.importance = importance_boost;
                inner.nodes.insert(id.to_string(), node);
                inner.out_edges.entry(id.to_string()).or_default();
                inner.in_edges.entry(id.to_string()).or_default();
            }
        }
        drop(inner);
        self.bump();
    }

    pub fn upsert_edge(&self, src: &str, dst: &str, description: &str, chunk_id: &str, weight_boost: f32) {
        let mut inner = self.inner.write();

        for endpoint in [src, dst] {
            if !inner.nodes.contains_key(endpoint) {
                let node = Node::new(endpoint, "", NodeType::Inferred);
                inner.nodes.insert(endpoint.to_string(), node);
                inner.out_edges.entry(endpoint.to_string()).or_default();
                inner.in_edges.entry(endpoint.to_string()).or_default();
            }
        }

        let existing = inner
            .out_edges
            .get_mut(src)
            .and_then(|edges| edges.iter_mut().find(|e| e.dst == dst));

        if let Some(edge) = existing {
            if !edge.description.contains(description) {
                edge.description = format!("{}; {}", edge.description, description);
            }
            edge.weight += weight_boost;
            edge.source_chunk_id = chunk_id.to_string();
            let updated = edge.clone();
            if let Some(in_edge) = inner.in_edges.get_mut(dst).and_then(|edges| edges.iter_mut().find(|e| e.src == src)) {
                *in_edge = updated;
            }
        } else {
            let edge = Edge {
                src: src.to_string(),
                dst: dst.to_string(),
                description: description.to_string(),
                weight: weight_boost,
                source_chunk_id: chunk_id.to_string(),
            };
            inner.out_edges.entry(src.to_string()).or_default().push(edge.clone());
            inner.in_edges.entry(dst.to_string()).or_default().push(edge);
        }

        drop(inner);
        self.bump();
    }

    /// Merge `source_id` into `target_id`: unions `source_chunks`, sums
    /// importance, keeps the longer description, rewires edges (summing
    /// weights on collision), and deletes `source_id`.
    ///
    /// **Backbone protection**: if `source_id` is backbone and `target_id`
    /// is not, the direction is swapped so the backbone node survives.
    pub fn merge_node(&self, source_id: &str, target_id: &str) -> Result<()> {
        if source_id == target_id {
            return Ok(());
        }

        let mut inner = self.inner.write();
        let (source_id, target_id) = {
            let source_is_backbone = inner.nodes.get(source_id).map(|n| n.node_type == NodeType::Backbone).unwrap_or(false);
            let target_is_backbone = inner.nodes.get(target_id).map(|n| n.node_type == NodeType::Backbone).unwrap_or(false);
            if source_is_backbone && !target_is_backbone {
                (target_id.to_string(), source_id.to_string())
            } else {
                (source_id.to_string(), target_id.to_string())
            }
        };

        let source = inner.nodes.remove(&source_id).ok_or_else(|| GraphError::NotFound(source_id.clone()))?;
        let target = inner.nodes.get_mut(&target_id).ok_or_else(|| GraphError::NotFound(target_id.clone()))?;

        if source.description.len() > target.description.len() {
            target.description = source.description;
        }
        target.source_chunks.extend(source.source_chunks);
        target.importance += source.importance;

        let out_edges = inner.out_edges.remove(&source_id).unwrap_or_default();
        let in_edges = inner.in_edges.remove(&source_id).unwrap_or_default();

        for mut edge in out_edges {
            if edge.dst == target_id {
                continue;
            }
            edge.src = target_id.clone();
            rewire_collision_aware(&mut inner.out_edges, &mut inner.in_edges, edge, true);
        }
        for mut edge in in_edges {
            if edge.src == target_id {
                continue;
            }
            edge.dst = target_id.clone();
            rewire_collision_aware(&mut inner.out_edges, &mut inner.in_edges, edge, false);
        }

        // Drop any dangling references to the removed node left in adjacency maps.
        for edges in inner.out_edges.values_mut() {
            edges.retain(|e| e.dst != source_id);
        }
        for edges in inner.in_edges.values_mut() {
            edges.retain(|e| e.src != source_id);
        }

        drop(inner);
        self.bump();
        Ok(())
    }

    pub fn out_neighbors(&self, id: &str) -> Vec<Edge> {
        self.inner.read().out_edges.get(id).cloned().unwrap_or_default()
    }

    pub fn in_neighbors(&self, id: &str) -> Vec<Edge> {
        self.inner.read().in_edges.get(id).cloned().unwrap_or_default()
    }

    pub fn degree(&self, id: &str) -> usize {
        let inner = self.inner.read();
        inner.out_edges.get(id).map(|e| e.len()).unwrap_or(0) + inner.in_edges.get(id).map(|e| e.len()).unwrap_or(0)
    }

    pub fn all_node_ids(&self) -> Vec<String> {
        self.inner.read().nodes.keys().cloned().collect()
    }

    pub fn all_nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.values().cloned().collect()
    }

    /// Nodes with no in- or out-edges.
    pub fn isolates(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .nodes
            .keys()
            .filter(|id| {
                inner.out_edges.get(*id).map(|e| e.is_empty()).unwrap_or(true)
                    && inner.in_edges.get(*id).map(|e| e.is_empty()).unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    pub fn remove_nodes(&self, ids: &[String]) {
        let mut inner = self.inner.write();
        let id_set: HashSet<&String> = ids.iter().collect();
        for id in ids {
            inner.nodes.remove(id);
            inner.out_edges.remove(id);
            inner.in_edges.remove(id);
        }
        for edges in inner.out_edges.values_mut() {
            edges.retain(|e| !id_set.contains(&e.dst));
        }
        for edges in inner.in_edges.values_mut() {
            edges.retain(|e| !id_set.contains(&e.src));
        }
        drop(inner);
        self.bump();
    }

    /// Weakly-connected components via undirected BFS over out+in adjacency.
    pub fn weakly_connected_components(&self) -> Vec<HashSet<String>> {
        let inner = self.inner.read();
        let mut visited: HashSet<String> = HashSet::new();
        let mut components = Vec::new();

        for start in inner.nodes.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut component = HashSet::new();
            let mut queue = vec![start.clone()];
            while let Some(id) = queue.pop() {
                if !component.insert(id.clone()) {
                    continue;
                }
                visited.insert(id.clone());
                for edge in inner.out_edges.get(&id).into_iter().flatten() {
                    if !component.contains(&edge.dst) {
                        queue.push(edge.dst.clone());
                    }
                }
                for edge in inner.in_edges.get(&id).into_iter().flatten() {
                    if !component.contains(&edge.src) {
                        queue.push(edge.src.clone());
                    }
                }
            }
            components.push(component);
        }

        components
    }

    /// Edges and nodes restricted to `node_ids`.
    pub fn subgraph(&self, node_ids: &HashSet<String>) -> (Vec<Node>, Vec<Edge>) {
        let inner = self.inner.read();
        let nodes: Vec<Node> = node_ids.iter().filter_map(|id| inner.nodes.get(id).cloned()).collect();
        let mut edges = Vec::new();
        for id in node_ids {
            for edge in inner.out_edges.get(id).into_iter().flatten() {
                if node_ids.contains(&edge.dst) {
                    edges.push(edge.clone());
                }
            }
        }
        (nodes, edges)
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        let mut nodes: Vec<Node> = inner.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<Edge> = inner.out_edges.values().flatten().cloned().collect();
        edges.sort_by(|a, b| (a.src.as_str(), a.dst.as_str()).cmp(&(b.src.as_str(), b.dst.as_str())));
        Snapshot { version: self.version(), nodes, edges }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for node in snapshot.nodes {
                inner.out_edges.entry(node.id.clone()).or_default();
                inner.in_edges.entry(node.id.clone()).or_default();
                inner.nodes.insert(node.id.clone(), node);
            }
            for edge in snapshot.edges {
                inner.out_edges.entry(edge.src.clone()).or_default().push(edge.clone());
                inner.in_edges.entry(edge.dst.clone()).or_default().push(edge);
            }
        }
        store.version.store(snapshot.version, Ordering::SeqCst);
        Ok(store)
    }
}

fn rewire_collision_aware(
    out_edges: &mut HashMap<String, Vec<Edge>>,
    in_edges: &mut HashMap<String, Vec<Edge>>,
    edge: Edge,
    from_out: bool,
) {
    let existing = out_edges.get_mut(&edge.src).and_then(|edges| edges.iter_mut().find(|e| e.dst == edge.dst));
    if let Some(current) = existing {
        current.weight += edge.weight;
        if !current.description.contains(&edge.description) {
            current.description = format!("{}; {}", current.description, edge.description);
        }
        let updated = current.clone();
        if let Some(mirror) = in_edges.get_mut(&edge.dst).and_then(|edges| edges.iter_mut().find(|e| e.src == updated.src)) {
            *mirror = updated;
        }
    } else {
        out_edges.entry(edge.src.clone()).or_default().push(edge.clone());
        in_edges.entry(edge.dst.clone()).or_default().push(edge);
    }
    let _ = from_out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_edge_auto_creates_inferred_endpoints() {
        let store = KnowledgeStore::new();
        store.upsert_edge("a", "b", "calls", "chunk_1", 1.0);
        assert_eq!(store.node("a").unwrap().node_type, NodeType::Inferred);
        assert_eq!(store.node("b").unwrap().node_type, NodeType::Inferred);
    }

    #[test]
    fn test_upsert_edge_merges_duplicate_edges() {
        let store = KnowledgeStore::new();
        store.upsert_edge("a", "b", "calls", "chunk_1", 1.0);
        store.upsert_edge("a", "b", "invokes", "chunk_2", 2.0);
        let edges = store.out_neighbors("a");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 3.0);
        assert!(edges[0].description.contains("calls"));
        assert!(edges[0].description.contains("invokes"));
        assert_eq!(edges[0].source_chunk_id, "chunk_2");
    }

    #[test]
    fn test_merge_node_protects_backbone() {
        let store = KnowledgeStore::new();
        store.upsert_node("backbone_1", "core service", NodeType::Backbone, GLOBAL_SUMMARY, 5.0);
        store.upsert_node("dup", "core service duplicate", NodeType::Intermediate, "chunk_1", 1.0);
        store.upsert_edge("other", "dup", "feeds", "chunk_1", 1.0);

        // Merge dup (non-backbone) into backbone_1 -- stays as-is.
        store.merge_node("dup", "backbone_1").unwrap();

        assert!(store.node("dup").is_none());
        let backbone = store.node("backbone_1").unwrap();
        assert!(backbone.importance > 5.0);
        assert!(store.in_neighbors("backbone_1").iter().any(|e| e.src == "other"));
    }

    #[test]
    fn test_merge_node_swaps_direction_when_source_is_backbone() {
        let store = KnowledgeStore::new();
        store.upsert_node("backbone_1", "core", NodeType::Backbone, GLOBAL_SUMMARY, 5.0);
        store.upsert_node("leaf", "leaf node", NodeType::Derived, "chunk_1", 1.0);

        // Caller passes (source=backbone, target=leaf); store swaps so the backbone survives.
        store.merge_node("backbone_1", "leaf").unwrap();

        assert!(store.node("backbone_1").is_some());
        assert!(store.node("leaf").is_none());
    }

    #[test]
    fn test_version_increments_on_mutation() {
        let store = KnowledgeStore::new();
        let v0 = store.version();
        store.upsert_node("a", "desc", NodeType::Derived, "chunk_1", 1.0);
        assert!(store.version() > v0);
    }

    #[test]
    fn test_weakly_connected_components() {
        let store = KnowledgeStore::new();
        store.upsert_edge("a", "b", "x", "c1", 1.0);
        store.upsert_node("isolated", "alone", NodeType::Derived, "c1", 1.0);

        let components = store.weakly_connected_components();
        assert_eq!(components.len(), 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = KnowledgeStore::new();
        store.upsert_edge("a", "b", "calls", "chunk_1", 1.0);
        let path = std::env::temp_dir().join(format!("kg-test-{}.json", uuid::Uuid::new_v4()));

        store.save(&path).unwrap();
        let loaded = KnowledgeStore::load(&path).unwrap();

        assert_eq!(loaded.len(), store.len());
        assert_eq!(loaded.version(), store.version());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_isolates_and_remove_nodes() {
        let store = KnowledgeStore::new();
        store.upsert_edge("a", "b", "x", "c1", 1.0);
        store.upsert_node("isolated", "alone", NodeType::Derived, "c1", 1.0);

        assert_eq!(store.isolates(), vec!["isolated".to_string()]);
        store.remove_nodes(&["isolated".to_string()]);
        assert!(store.node("isolated").is_none());
    }
}
