//! Retrieval index construction.
//!
//! Chunks the workflow's documents and embeds them into an in-memory
//! [`EmbeddingIndex`].

pub mod chunker;

use std::sync::Arc;

use smartflow_core::memory::box_embedder::BoxEmbedder;
use smartflow_core::retrieval::embedding_index::EmbeddingIndex;
use smartflow_types::error::RetrievalError;

use self::chunker::DocumentChunker;

/// Chunk `documents` and build an index over the passages.
pub async fn build_index(
    embedder: Arc<BoxEmbedder>,
    documents: &[String],
) -> Result<EmbeddingIndex, RetrievalError> {
    let passages = DocumentChunker::default().chunk_all(documents);
    tracing::info!(
        documents = documents.len(),
        passages = passages.len(),
        "building retrieval index"
    );
    EmbeddingIndex::build(embedder, passages).await
}
