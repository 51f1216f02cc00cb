//! Flat (brute-force) vector index over provider embeddings.
//!
//! Distances are squared Euclidean, the same convention as a flat L2
//! index: 0 means identical and larger is further away.

use async_trait::async_trait;
use llmcraft_core::error::MemoryError;
use llmcraft_core::provider::{EmbeddingRequest, Provider};
use llmcraft_core::retrieval::{DocumentChunk, ScoredChunk, VectorStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// How many chunks go into a single embedding request.
const EMBED_BATCH: usize = 32;

/// Squared Euclidean distance. Mismatched lengths compare as infinitely far.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

struct IndexedChunk {
    chunk: DocumentChunk,
    embedding: Vec<f32>,
}

/// An exhaustive nearest-neighbour index held in memory.
pub struct FlatVectorIndex {
    embedder: Arc<dyn Provider>,
    model: String,
    entries: RwLock<Vec<IndexedChunk>>,
    len: AtomicUsize,
}

impl FlatVectorIndex {
    /// An empty index that embeds through `embedder` using `model`.
    pub fn new(embedder: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            embedder,
            model: model.into(),
            entries: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        let expected = inputs.len();
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        if response.embeddings.len() != expected {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {expected} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

#[async_trait]
impl VectorStore for FlatVectorIndex {
    async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> Result<usize, MemoryError> {
        let mut indexed = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let inputs = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embed(inputs).await?;
            indexed.extend(batch.iter().cloned().zip(embeddings).map(|(chunk, embedding)| {
                IndexedChunk { chunk, embedding }
            }));
        }

        let mut entries = self.entries.write().await;
        let dim = entries
            .first()
            .or_else(|| indexed.first())
            .map(|e| e.embedding.len());
        if let Some(dim) = dim {
            if let Some(bad) = indexed.iter().find(|e| e.embedding.len() != dim) {
                return Err(MemoryError::EmbeddingFailed(format!(
                    "embedding dimension {} does not match index dimension {dim}",
                    bad.embedding.len()
                )));
            }
        }

        let added = indexed.len();
        entries.extend(indexed);
        self.len.store(entries.len(), Ordering::Release);
        debug!(added, total = entries.len(), "Indexed document chunks");
        Ok(added)
    }

    async fn similarity_search_with_distance(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, MemoryError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embed(vec![query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &IndexedChunk)> = entries
            .iter()
            .map(|e| (squared_l2(&e.embedding, &query_embedding), e))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, e)| ScoredChunk {
                content: e.chunk.content.clone(),
                source: e.chunk.source.clone(),
                distance,
            })
            .collect())
    }

    fn is_initialized(&self) -> bool {
        !self.is_empty()
    }
}
