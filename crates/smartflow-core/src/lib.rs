//! Execution engine and port trait definitions for SmartFlow.
//!
//! This crate defines the "ports" (LLM, embedding, retrieval, and state
//! store traits) that the infrastructure layer implements, plus the
//! evaluation and execution loop built on top of them. It depends only on
//! `smartflow-types` -- never on `smartflow-infra` or any database/IO crate.

pub mod evaluation;
pub mod llm;
pub mod memory;
pub mod repository;
pub mod retrieval;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
