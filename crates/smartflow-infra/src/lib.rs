//! Infrastructure layer for SmartFlow.
//!
//! Implements the ports defined in `smartflow-core`: SQLite and JSON-file
//! state stores, OpenAI-compatible LLM and embedding clients, document
//! chunking for the retrieval index, and the global config loader.

pub mod config;
pub mod embedding;
pub mod json;
pub mod llm;
pub mod retrieval;
pub mod sqlite;
pub mod store;
