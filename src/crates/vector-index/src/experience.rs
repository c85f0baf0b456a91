//! Experience memory: dedup-by-question persistence plus a [`VectorIndex`]
//! for similarity search, shared by the Router (`router.json`-style success
//! records) and the Code Reviser (`mistakes.json`-style correction records).
//!
//! Grounded on `original_source/backend/router.py` (`learn_from_success`,
//! `_save_to_disk`) and `code_revise.py` (`record_mistake`): both load an
//! existing JSON array of `{q, a, ...}` records into a shared
//! `LocalKnowledgeBase` at cold start, and on a new success/mistake, skip
//! persistence if the question already exists, else append to disk and
//! hot-insert into the live index. Embedding (and therefore cold-start
//! rehydration of the index from disk) is the caller's responsibility —
//! this crate only knows about vectors, not how to produce them.

use crate::error::Result;
use crate::index::{DedupKey, QueryResult, VectorIndex};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single experience record: a question/situation (`q`) and the
/// remembered answer/fix (`a`), plus free-form extra fields (e.g. the
/// Router's `source_code`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub q: String,
    pub a: String,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub extra: std::collections::HashMap<String, String>,
}

/// Load the JSON array of experience records at `path`. A missing file is
/// treated as an empty set (cold start with no prior experience).
pub fn load_records(path: &Path) -> Result<Vec<ExperienceRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&text)?)
}

/// Append `record` to the JSON array at `path` unless a record with the
/// same `q` already exists. Returns whether it was newly inserted.
/// Creates the parent directory and an empty file if neither exists yet.
pub fn append_record_if_new(path: &Path, record: &ExperienceRecord) -> Result<bool> {
    let mut records = load_records(path)?;
    if records.iter().any(|r| r.q == record.q) {
        return Ok(false);
    }

    records.push(record.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(true)
}

const ORIGINAL_Q_FIELD: &str = "original_q";

/// A named experience index (router successes or revision mistakes): a
/// [`VectorIndex`] over `q`, with `a` (and `extra`) carried as payload/metadata.
pub struct ExperienceMemory {
    index: VectorIndex,
    path: std::path::PathBuf,
}

impl ExperienceMemory {
    pub fn new(dimension: usize, path: impl Into<std::path::PathBuf>) -> Self {
        Self { index: VectorIndex::new(dimension), path: path.into() }
    }

    /// Insert a pre-embedded record into the live index, without touching disk.
    /// Used both for hot inserts after a fresh success/mistake, and to
    /// rehydrate the index from disk-loaded records at cold start.
    pub fn hydrate(&self, record: &ExperienceRecord, embedding: Vec<f32>) -> Result<()> {
        let mut metadata = record.extra.clone();
        metadata.insert(ORIGINAL_Q_FIELD.to_string(), record.q.clone());

        self.index.upsert(crate::index::Entry {
            id: uuid::Uuid::new_v4().to_string(),
            vector: embedding,
            payload: record.a.clone(),
            metadata,
        })
    }

    /// Record a new success/mistake: skip if `record.q` is already on disk,
    /// else append to disk and hot-insert into the live index.
    pub fn record(&self, record: &ExperienceRecord, embedding: Vec<f32>) -> Result<bool> {
        let inserted = append_record_if_new(&self.path, record)?;
        if inserted {
            self.hydrate(record, embedding)?;
        }
        Ok(inserted)
    }

    /// Similarity search over remembered experiences, deduped by the
    /// original question text (mirrors `rag.py`'s `original_q`-keyed dedup).
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        oversample_factor: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<QueryResult>> {
        self.index.query(
            query_embedding,
            top_k,
            oversample_factor,
            DedupKey::ByMetaField(ORIGINAL_Q_FIELD.to_string()),
            threshold,
        )
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("experience-test-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_load_records_missing_file_is_empty() {
        let path = temp_path();
        assert_eq!(load_records(&path).unwrap(), Vec::new());
    }

    #[test]
    fn test_append_record_if_new_dedups_by_q() {
        let path = temp_path();
        let record = ExperienceRecord { q: "how do I draw a flowchart?".to_string(), a: "use flowchart.md".to_string(), extra: Default::default() };

        assert!(append_record_if_new(&path, &record).unwrap());
        assert!(!append_record_if_new(&path, &record).unwrap(), "duplicate q must not be re-inserted");
        assert_eq!(load_records(&path).unwrap().len(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_record_and_search_round_trip() {
        let path = temp_path();
        let memory = ExperienceMemory::new(2, &path);

        let record = ExperienceRecord { q: "flowchart question".to_string(), a: "flowchart.md".to_string(), extra: Default::default() };
        assert!(memory.record(&record, vec![1.0, 0.0]).unwrap());
        assert!(!memory.record(&record, vec![1.0, 0.0]).unwrap(), "second record call should be a no-op");

        let results = memory.search(&[1.0, 0.0], 1, 3, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload, "flowchart.md");

        std::fs::remove_file(&path).ok();
    }
}
