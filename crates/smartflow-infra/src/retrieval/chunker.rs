//! Document chunking for the retrieval index.
//!
//! Uses the `text-splitter` crate, which prefers semantic boundaries
//! (paragraphs, then sentences, then words) before falling back to
//! characters.
//!
//! Chunk target size: 1000 characters, 200 characters of overlap.

use smartflow_types::error::RetrievalError;
use text_splitter::{ChunkConfig, TextSplitter};

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

/// Splits documents into overlapping passages.
pub struct DocumentChunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl DocumentChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self, RetrievalError> {
        let config = ChunkConfig::new(size)
            .with_overlap(overlap)
            .map_err(|e| RetrievalError::Chunking(e.to_string()))?;
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    /// Chunk every document, preserving corpus order. Blank chunks are
    /// dropped.
    pub fn chunk_all(&self, documents: &[String]) -> Vec<String> {
        documents
            .iter()
            .flat_map(|doc| self.splitter.chunks(doc))
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        // CHUNK_OVERLAP < CHUNK_SIZE, so the fallback is unreachable.
        let config = ChunkConfig::new(CHUNK_SIZE)
            .with_overlap(CHUNK_OVERLAP)
            .unwrap_or_else(|_| ChunkConfig::new(CHUNK_SIZE));
        Self {
            splitter: TextSplitter::new(config),
        }
    }
}
