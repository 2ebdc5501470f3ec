//! Workflow engine: substep and step execution, retries, checkpointing, and
//! definition loading.
//!
//! - `definition` -- YAML/JSON parsing, validation, step construction
//! - `template` -- `{name}` prompt rendering
//! - `transform` -- plain-function substeps and the named registry
//! - `substep` -- one prompt or transform invocation, evaluated and logged
//! - `step` -- ordered substeps with step-level evaluation
//! - `retry` -- retry budget decisions
//! - `checkpoint` -- committed memory buffer and snapshot versions
//! - `telemetry` -- best-effort log entries
//! - `executor` -- the workflow controller

pub mod checkpoint;
pub mod definition;
pub mod executor;
pub mod retry;
pub mod step;
pub mod substep;
pub mod telemetry;
pub mod template;
pub mod transform;
