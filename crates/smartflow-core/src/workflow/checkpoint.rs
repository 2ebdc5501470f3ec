//! Durable checkpointing of the run's memory buffer.
//!
//! `WorkflowState` owns the committed [`MemoryBuffer`] of a run and its
//! snapshot version. Steps work on a scratch copy; only [`WorkflowState::commit`]
//! replaces the committed buffer, and only after the snapshot was persisted.

use serde_json::Value;
use smartflow_types::state::StateSnapshot;

use crate::memory::buffer::MemoryBuffer;
use crate::repository::state::StateStore;

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Committed memory and version of one workflow, backed by a [`StateStore`].
///
/// Generic over `S: StateStore` so it works with any storage backend
/// (SQLite, JSON files, in-memory mock).
pub struct WorkflowState<S: StateStore> {
    store: S,
    workflow_id: String,
    memory: MemoryBuffer,
    version: i64,
}

impl<S: StateStore> WorkflowState<S> {
    /// An empty state at version 0. Call [`load`](Self::load) to pick up a
    /// stored snapshot.
    pub fn new(store: S, workflow_id: impl Into<String>) -> Self {
        Self {
            store,
            workflow_id: workflow_id.into(),
            memory: MemoryBuffer::new(),
            version: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Version of the last persisted snapshot (0 when nothing was saved).
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Replace the in-memory state with the stored snapshot.
    pub async fn load(&mut self) -> Result<(), CheckpointError> {
        let snapshot = self
            .store
            .load_state(&self.workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        let version = self
            .store
            .load_version(&self.workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .unwrap_or(0);

        tracing::debug!(
            workflow_id = self.workflow_id.as_str(),
            entries = snapshot.len(),
            version,
            "loaded workflow state"
        );

        self.memory = MemoryBuffer::from_snapshot(snapshot);
        self.version = version;
        Ok(())
    }

    /// Persist the current memory as the next version.
    pub async fn save(&mut self) -> Result<i64, CheckpointError> {
        let next = self.version + 1;
        self.persist(&self.memory.snapshot(), next).await?;
        self.version = next;
        Ok(next)
    }

    /// Persist `memory` as the next version and adopt it as the committed
    /// buffer. On failure the previously committed buffer is kept.
    pub async fn commit(&mut self, memory: MemoryBuffer) -> Result<i64, CheckpointError> {
        let next = self.version + 1;
        self.persist(&memory.snapshot(), next).await?;
        self.memory = memory;
        self.version = next;
        Ok(next)
    }

    async fn persist(&self, snapshot: &StateSnapshot, version: i64) -> Result<(), CheckpointError> {
        self.store
            .save_state(&self.workflow_id, snapshot, version)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        tracing::debug!(
            workflow_id = self.workflow_id.as_str(),
            version,
            "checkpointed workflow state"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Memory access
    // -----------------------------------------------------------------------

    pub fn memory(&self) -> &MemoryBuffer {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryBuffer {
        &mut self.memory
    }

    pub fn get_memory(&self, key: &str) -> Option<&Value> {
        self.memory.get(key)
    }

    pub fn update_memory(&mut self, key: impl Into<String>, value: Value) {
        self.memory.insert(key, value);
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn all_memory(&self) -> StateSnapshot {
        self.memory.snapshot()
    }
}

// ---------------------------------------------------------------------------
// CheckpointError
// ---------------------------------------------------------------------------

/// Errors from checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("repository error: {0}")]
    Repository(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let store = MemoryStore::new();
        let mut state = WorkflowState::new(store.clone(), "wf-1");
        state.update_memory("x", json!(1));
        assert_eq!(state.save().await.unwrap(), 1);

        let mut reloaded = WorkflowState::new(store, "wf-1");
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.version(), 1);
        assert_eq!(reloaded.get_memory("x"), Some(&json!(1)));
        assert_eq!(reloaded.all_memory().len(), 1);
    }

    #[tokio::test]
    async fn test_load_unknown_is_empty() {
        let mut state = WorkflowState::new(MemoryStore::new(), "unknown-id");
        state.load().await.unwrap();
        assert!(state.memory().is_empty());
        assert_eq!(state.version(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_previous_memory() {
        let store = MemoryStore::new();
        let mut state = WorkflowState::new(store.clone(), "wf");
        state.update_memory("a", json!({"result": "kept"}));

        let mut scratch = state.memory().clone();
        scratch.insert("b", json!({"result": "discarded"}));

        store.fail_next_saves(1);
        let err = state.commit(scratch.clone()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Repository(_)));
        assert!(!state.memory().contains("b"));
        assert_eq!(state.version(), 0);

        assert_eq!(state.commit(scratch).await.unwrap(), 1);
        assert!(state.memory().contains("b"));
        assert_eq!(store.load_version("wf").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_clear_memory() {
        let mut state = WorkflowState::new(MemoryStore::new(), "wf");
        state.update_memory("a", json!(1));
        state.memory_mut().insert("b", json!(2));
        assert_eq!(state.all_memory().len(), 2);
        state.clear_memory();
        assert!(state.get_memory("a").is_none());
    }
}
