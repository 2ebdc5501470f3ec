//! Shared domain types for SmartFlow.
//!
//! This crate contains the data shapes used across the workflow engine:
//! success criteria, evaluation results and metrics, telemetry log entries,
//! workflow definitions, LLM request/response types, configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod criteria;
pub mod error;
pub mod evaluation;
pub mod llm;
pub mod state;
pub mod workflow;
