//! Run-scoped memory and embedding abstractions for SmartFlow.
//!
//! - `MemoryBuffer`: accumulating substep outputs for one run
//! - `Embedder` / `BoxEmbedder`: text-to-vector ports
//! - `similarity`: cosine similarity for past-output relevance

pub mod box_embedder;
pub mod buffer;
pub mod embedder;
pub mod similarity;
