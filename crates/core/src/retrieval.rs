//! Vector store trait and the document types that flow through retrieval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// A slice of a source document, ready to be embedded and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    /// Where the chunk came from (a file path for ingested documents).
    pub source: String,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// A nearest-neighbour hit with its raw distance (0 = identical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub source: String,
    pub distance: f32,
}

/// A retrieval result with a normalized similarity in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub source: String,
    pub score: f32,
}

/// Nearest-neighbour search over embedded document chunks.
///
/// Read-only once populated; concurrent searches need no coordination.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and index the given chunks. Returns how many were indexed.
    async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> Result<usize, MemoryError>;

    /// The `k` nearest chunks to `query`, closest first.
    async fn similarity_search_with_distance(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, MemoryError>;

    /// Whether any documents have been indexed.
    fn is_initialized(&self) -> bool;
}
