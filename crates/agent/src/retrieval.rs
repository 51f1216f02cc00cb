//! Retrieval gate: turns a query into scored, thresholded grounding text.
//!
//! Raw nearest-neighbour distances become similarities via
//! `1 / (1 + d)`, so an identical chunk scores 1.0 and scores fall as
//! distance grows. Hits under the caller's threshold never leave the gate.

use llmcraft_config::RetrievalConfig;
use llmcraft_core::error::MemoryError;
use llmcraft_core::retrieval::{RetrievedDocument, VectorStore};
use llmcraft_memory::{TextSplitter, load_documents};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Map a raw distance to a similarity in `(0, 1]`.
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

pub struct RetrievalGate {
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    extensions: Vec<String>,
}

impl RetrievalGate {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            store,
            splitter: TextSplitter::new(defaults.chunk_size, defaults.chunk_overlap),
            extensions: defaults.extensions,
        }
    }

    pub fn from_config(store: Arc<dyn VectorStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            extensions: config.extensions.clone(),
        }
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Load, split, embed and index every document under `corpus_path`.
    ///
    /// An absent or empty corpus is not an error: the gate stays
    /// uninitialized and retrieval returns nothing. Returns the number of
    /// chunks indexed.
    pub async fn init(&self, corpus_path: &Path) -> Result<usize, MemoryError> {
        let docs = load_documents(corpus_path, &self.extensions);
        if docs.is_empty() {
            info!(path = %corpus_path.display(), "No documents found, retrieval disabled");
            return Ok(0);
        }

        let chunks = self.splitter.split_documents(&docs);
        let indexed = self.store.add_documents(chunks).await?;
        info!(chunks = indexed, documents = docs.len(), "Retrieval index ready");
        Ok(indexed)
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    /// Up to `k` documents at or above `score_threshold`, most similar first.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedDocument>, MemoryError> {
        if !self.store.is_initialized() {
            debug!("Retrieval index not initialized, skipping grounding");
            return Ok(Vec::new());
        }

        let hits = self.store.similarity_search_with_distance(query, k).await?;
        let total = hits.len();
        let mut docs: Vec<RetrievedDocument> = hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                score: similarity(hit.distance),
                content: hit.content,
                source: hit.source,
            })
            .filter(|doc| doc.score >= score_threshold)
            .collect();
        docs.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(hits = total, kept = docs.len(), score_threshold, "Retrieved documents");
        Ok(docs)
    }

    /// Render results as a block for the system prompt. Empty input gives
    /// empty text, meaning "no grounding available".
    pub fn format_context(results: &[RetrievedDocument]) -> String {
        let mut out = String::new();
        for (i, doc) in results.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(
                out,
                "[Document {}] (source: {}, score: {:.2})\n{}",
                i + 1,
                doc.source,
                doc.score,
                doc.content.trim()
            );
        }
        out
    }
}
