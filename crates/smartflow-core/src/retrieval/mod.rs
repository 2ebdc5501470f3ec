//! Retrieval for RAG-enabled substeps.
//!
//! - `RetrievalIndex` / `BoxRetrievalIndex`: `search(query, k) -> passages`
//! - `EmbeddingIndex`: in-memory index ranked by cosine similarity

pub mod embedding_index;
pub mod index;
