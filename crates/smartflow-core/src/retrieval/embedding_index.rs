//! In-memory embedding index.
//!
//! Passages are embedded once at build time; queries are embedded on each
//! search and ranked by cosine similarity. Chunking the raw corpus into
//! passages happens before this point (see `smartflow-infra::retrieval`).

use std::sync::Arc;

use smartflow_types::error::RetrievalError;

use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::similarity::cosine_similarity;

use super::index::RetrievalIndex;

pub struct EmbeddingIndex {
    embedder: Arc<BoxEmbedder>,
    passages: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Embed every passage and build the index.
    pub async fn build(
        embedder: Arc<BoxEmbedder>,
        passages: Vec<String>,
    ) -> Result<Self, RetrievalError> {
        let vectors = if passages.is_empty() {
            Vec::new()
        } else {
            embedder
                .embed(&passages)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?
        };

        if vectors.len() != passages.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} vectors, got {}",
                passages.len(),
                vectors.len()
            )));
        }

        tracing::debug!(
            passages = passages.len(),
            model = embedder.model_name(),
            "built embedding index"
        );

        Ok(Self {
            embedder,
            passages,
            vectors,
        })
    }
}

impl RetrievalIndex for EmbeddingIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        if self.passages.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine_similarity(&query_vector, v), i))
            .collect();
        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.passages[i].clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.passages.len()
    }
}
