//! State and telemetry store trait definition.
//!
//! Defines the durable record of workflow state snapshots and per-substep
//! execution logs. The infrastructure layer (smartflow-infra) implements this
//! trait with SQLite and flat-file JSON persistence; both backends store
//! entries of identical shape.

use smartflow_types::error::RepositoryError;
use smartflow_types::state::{StateSnapshot, StepLogEntry};

/// Repository trait for workflow state and telemetry.
pub trait StateStore: Send + Sync {
    /// Upsert the snapshot for `workflow_id`, keeping the original creation time.
    fn save_state(
        &self,
        workflow_id: &str,
        state: &StateSnapshot,
        version: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load the snapshot for `workflow_id`. Unknown ids yield an empty map.
    fn load_state(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<StateSnapshot, RepositoryError>> + Send;

    /// Stored version for `workflow_id`, or `None` when nothing was saved.
    fn load_version(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    /// Append one telemetry entry.
    fn log_step(
        &self,
        entry: &StepLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All telemetry entries for `workflow_id`, in insertion order.
    fn get_logs(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<StepLogEntry>, RepositoryError>> + Send;

    /// Ids of every workflow with a stored snapshot, sorted.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
