//! Embedding backend abstraction.
//!
//! Mirrors the `llm` crate's remote-provider shape (`reqwest`-based,
//! configurable base URL/model/timeout) since embedding backends are, in
//! practice, another HTTP endpoint the pipeline calls out to —
//! grounded on `original_source/backend/rag.py`'s use of a
//! `SentenceTransformer`-backed embedding model (`BAAI/bge-m3`), ported here
//! as a remote call rather than an in-process model load.

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Wraps an embedding backend; returns L2-normalized vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode a batch of texts into L2-normalized vectors, one per input,
    /// each of length [`Embedder::dimension`].
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Fixed output dimension for this backend.
    fn dimension(&self) -> usize;
}

/// Test double that returns deterministic zero vectors. Useful for unit
/// tests of callers that don't care about embedding semantics.
pub struct NullEmbedder {
    dimension: usize,
}

impl NullEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for NullEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Calls out to an HTTP embeddings endpoint (e.g. a self-hosted
/// `bge-m3`-compatible server).
pub struct RemoteEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl RemoteEmbedder {
    /// Construct a client against `base_url`. Fails with
    /// [`IngestError::BackendUnavailable`] if the HTTP client cannot be
    /// built (e.g. an invalid TLS configuration), matching spec.md §4.2's
    /// model-init failure path.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::BackendUnavailable(e.to_string()))?;

        Ok(Self { base_url: base_url.into(), model: model.into(), dimension, client })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let request = EmbedRequest { model: &self.model, input: texts };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "embedding request failed, falling back to zero vectors");
                return Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect());
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "embedding backend returned an error, falling back to zero vectors");
            return Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect());
        }

        let parsed: EmbedResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse embedding response, falling back to zero vectors");
                return Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect());
            }
        };

        Ok(parsed.data.into_iter().map(|d| l2_normalize(d.embedding)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_embedder_returns_zero_vectors_of_dimension() {
        let embedder = NullEmbedder::new(4);
        let vectors = embedder.encode(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.0; 4]);
    }

    #[test]
    fn test_l2_normalize_produces_unit_vector() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_stays_zero() {
        let normalized = l2_normalize(vec![0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_remote_embedder_degrades_to_zero_vector_on_connection_failure() {
        let embedder = RemoteEmbedder::new("http://127.0.0.1:1", "bge-m3", 4).unwrap();
        let vectors = embedder.encode(&["hello".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0; 4]]);
    }
}
