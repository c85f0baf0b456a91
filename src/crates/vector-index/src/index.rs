//! Cosine-similarity vector index with dedup-aware, threshold-aware query.
//!
//! Grounded on `original_source/backend/rag.py`'s `LocalKnowledgeBase.search`
//! / `search_score`: both oversample past `top_k` (3x for plain search, 5x
//! when a similarity threshold narrows results), scan the oversampled hits
//! in descending similarity order, keep the first occurrence per dedup key,
//! and physically delete the now-redundant lower-ranked duplicates from the
//! index — the dedup pass is a standing cleanup, not just a view filter.

use crate::error::{Result, VectorIndexError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to detect that two hits are "the same" answer surfacing twice.
#[derive(Debug, Clone)]
pub enum DedupKey {
    /// Hash the payload text itself.
    ByPayloadHash,
    /// Compare a named metadata field (e.g. the original question text).
    ByMetaField(String),
}

/// A stored vector plus its opaque payload and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A single ranked hit returned from [`VectorIndex::query`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub payload: String,
    pub metadata: HashMap<String, String>,
    pub similarity: f32,
}

/// In-memory cosine-similarity index, safe to share across tasks.
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, entries: RwLock::new(Vec::new()) }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert or replace an entry by id.
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        if entry.vector.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: entry.vector.len(),
            });
        }

        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
        } else {
            entries.push(entry);
        }
        Ok(())
    }

    /// Remove an entry by id. No-op if the id is absent.
    pub fn delete(&self, id: &str) {
        self.entries.write().retain(|e| e.id != id);
    }

    /// Cosine-similarity query with oversample-then-dedup-then-threshold
    /// scan order, matching `rag.py`'s `search`/`search_score`.
    ///
    /// `oversample_factor` controls how many raw hits are scored before
    /// dedup/threshold narrows them to `top_k` (3 for a plain top-k scan,
    /// 5 when `threshold` is set, per the original's two call sites).
    /// Entries that dedup removes are deleted from the index as a side
    /// effect, same as the original's redundant-id cleanup.
    pub fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
        oversample_factor: usize,
        dedup: DedupKey,
        threshold: Option<f32>,
    ) -> Result<Vec<QueryResult>> {
        if query_vector.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let oversampled = top_k.saturating_mul(oversample_factor.max(1));

        let mut scored: Vec<(f32, Entry)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .map(|e| (cosine_similarity(query_vector, &e.vector), e.clone()))
                .collect()
        };
        // Highest similarity first; results are pre-sorted so a threshold
        // scan can break out early instead of filtering the whole set.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(oversampled);

        let mut seen_keys: HashMap<String, ()> = HashMap::new();
        let mut redundant_ids: Vec<String> = Vec::new();
        let mut results = Vec::with_capacity(top_k);

        for (similarity, entry) in scored {
            if let Some(threshold) = threshold {
                if similarity < threshold {
                    break;
                }
            }

            let key = dedup_key(&dedup, &entry);
            if seen_keys.contains_key(&key) {
                redundant_ids.push(entry.id.clone());
                continue;
            }
            seen_keys.insert(key, ());

            results.push(QueryResult {
                id: entry.id.clone(),
                payload: entry.payload.clone(),
                metadata: entry.metadata.clone(),
                similarity,
            });

            if results.len() >= top_k {
                break;
            }
        }

        if !redundant_ids.is_empty() {
            let mut entries = self.entries.write();
            entries.retain(|e| !redundant_ids.contains(&e.id));
        }

        Ok(results)
    }

    /// Persist the index to a JSON snapshot.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let entries = self.entries.read();
        let json = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load an index snapshot written by [`VectorIndex::save`].
    pub fn load(path: &std::path::Path, dimension: usize) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let entries: Vec<Entry> = serde_json::from_str(&json)?;
        Ok(Self { dimension, entries: RwLock::new(entries) })
    }
}

fn dedup_key(dedup: &DedupKey, entry: &Entry) -> String {
    match dedup {
        DedupKey::ByPayloadHash => entry.payload.clone(),
        DedupKey::ByMetaField(field) => entry
            .metadata
            .get(field)
            .cloned()
            .unwrap_or_else(|| entry.payload.clone()),
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
    use std::collections::HashMap as Map;

    fn entry(id: &str, vector: Vec<f32>, payload: &str) -> Entry {
        Entry { id: id.to_string(), vector, payload: payload.to_string(), metadata: Map::new() }
    }

    #[test]
    fn test_upsert_rejects_dimension_mismatch() {
        let index = VectorIndex::new(3);
        let err = index.upsert(entry("a", vec![1.0, 0.0], "x")).unwrap_err();
        assert!(matches!(err, VectorIndexError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_query_ranks_by_cosine_similarity() {
        let index = VectorIndex::new(2);
        index.upsert(entry("a", vec![1.0, 0.0], "a-answer")).unwrap();
        index.upsert(entry("b", vec![0.0, 1.0], "b-answer")).unwrap();

        let results = index
            .query(&[1.0, 0.0], 2, 3, DedupKey::ByPayloadHash, None)
            .unwrap();

        assert_eq!(results[0].id, "a");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[test]
    fn test_query_threshold_breaks_early() {
        let index = VectorIndex::new(2);
        index.upsert(entry("a", vec![1.0, 0.0], "a-answer")).unwrap();
        index.upsert(entry("b", vec![0.0, 1.0], "b-answer")).unwrap();

        let results = index
            .query(&[1.0, 0.0], 2, 5, DedupKey::ByPayloadHash, Some(0.5))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn test_query_dedup_deletes_redundant_entries() {
        let index = VectorIndex::new(2);
        let mut meta_a = Map::new();
        meta_a.insert("original_q".to_string(), "same question".to_string());
        let mut meta_b = meta_a.clone();

        index
            .upsert(Entry { id: "a".to_string(), vector: vec![1.0, 0.0], payload: "answer".to_string(), metadata: meta_a })
            .unwrap();
        index
            .upsert(Entry { id: "b".to_string(), vector: vec![0.99, 0.01], payload: "answer".to_string(), metadata: { meta_b.insert("x".into(), "y".into()); meta_b } })
            .unwrap();

        assert_eq!(index.len(), 2);

        let results = index
            .query(&[1.0, 0.0], 2, 3, DedupKey::ByMetaField("original_q".to_string()), None)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(index.len(), 1, "the redundant duplicate should have been deleted");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("vector-index-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.json");

        let index = VectorIndex::new(2);
        index.upsert(entry("a", vec![1.0, 0.0], "a-answer")).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, 2).unwrap();
        assert_eq!(loaded.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
