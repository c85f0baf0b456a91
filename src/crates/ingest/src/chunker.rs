//! Dual-layer text splitter: big chunks for intermediate-stage extraction,
//! small chunks for retrieval and drilldown.
//!
//! Grounded on the fixed window/overlap scheme implied by
//! `original_source/backend/rag.py`'s splitter usage, simplified to the
//! flat window/overlap scan spec.md prescribes (no markdown-header
//! awareness — the original's header-first split is not required here).

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// Which retrieval layer a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Big,
    Small,
}

/// A single windowed slice of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub vec: Option<Vec<f32>>,
    pub granularity: Granularity,
}

const BIG_SIZE: usize = 1500;
const BIG_OVERLAP: usize = 200;
const SMALL_SIZE: usize = 500;
const SMALL_OVERLAP: usize = 100;

/// Split `text` into both big and small chunks, scoped to `source`.
///
/// IDs are `"<granularity>_<ordinal>"` per spec.md §3, ordinal starting at 0
/// within each granularity. Chunk order matches byte order of `text`.
pub fn chunk_text(text: &str, source: &str) -> Result<Vec<Chunk>> {
    if text.is_empty() {
        return Err(IngestError::InvalidInput("text must not be empty".to_string()));
    }

    let mut chunks = window_split(text, BIG_SIZE, BIG_OVERLAP, Granularity::Big, source);
    chunks.extend(window_split(text, SMALL_SIZE, SMALL_OVERLAP, Granularity::Small, source));
    Ok(chunks)
}

fn window_split(text: &str, size: usize, overlap: usize, granularity: Granularity, source: &str) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let prefix = match granularity {
        Granularity::Big => "big",
        Granularity::Small => "small",
    };

    let mut chunks = Vec::new();
    let mut ordinal = 0usize;
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let slice: String = chars[start..end].iter().collect();
        chunks.push(Chunk {
            id: format!("{}_{}", prefix, ordinal),
            text: slice,
            source: source.to_string(),
            vec: None,
            granularity,
        });

        ordinal += 1;
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_invalid() {
        let err = chunk_text("", "doc.md").unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[test]
    fn test_chunk_ids_and_ordering() {
        let text = "a".repeat(3000);
        let chunks = chunk_text(&text, "doc.md").unwrap();

        let big: Vec<_> = chunks.iter().filter(|c| c.granularity == Granularity::Big).collect();
        assert_eq!(big[0].id, "big_0");
        assert_eq!(big[1].id, "big_1");

        // Byte order: earlier ordinals cover earlier text.
        assert!(text.starts_with(&big[0].text[..10]));
    }

    #[test]
    fn test_overlap_step_is_size_minus_overlap() {
        let text = "x".repeat(2000);
        let chunks = chunk_text(&text, "doc.md").unwrap();
        let small: Vec<_> = chunks.iter().filter(|c| c.granularity == Granularity::Small).collect();

        // step = 500 - 100 = 400, so chunk 1 starts at char 400.
        assert_eq!(small[0].text.len(), 500);
        assert_eq!(small[1].text.len(), 500);
    }

    #[test]
    fn test_short_text_produces_single_chunk_per_granularity() {
        let chunks = chunk_text("short text", "doc.md").unwrap();
        let big_count = chunks.iter().filter(|c| c.granularity == Granularity::Big).count();
        let small_count = chunks.iter().filter(|c| c.granularity == Granularity::Small).count();
        assert_eq!(big_count, 1);
        assert_eq!(small_count, 1);
    }
}
