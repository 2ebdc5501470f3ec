//! Runtime selection between the SQLite and JSON backends.

use std::path::Path;

use smartflow_core::repository::state::StateStore;
use smartflow_types::config::StorageKind;
use smartflow_types::error::RepositoryError;
use smartflow_types::state::{StateSnapshot, StepLogEntry};

use crate::json::state::JsonStateStore;
use crate::sqlite::pool::{DatabasePool, database_url};
use crate::sqlite::state::SqliteStateStore;

/// Either storage backend behind one `StateStore` type.
#[derive(Clone)]
pub enum AnyStateStore {
    Sqlite(SqliteStateStore),
    Json(JsonStateStore),
}

impl AnyStateStore {
    /// Open the backend of `kind` under `data_dir`.
    pub async fn open(kind: StorageKind, data_dir: &Path) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let store = match kind {
            StorageKind::Sqlite => {
                let pool = DatabasePool::new(&database_url(data_dir))
                    .await
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                AnyStateStore::Sqlite(SqliteStateStore::new(pool))
            }
            StorageKind::Json => AnyStateStore::Json(JsonStateStore::open(data_dir).await?),
        };
        tracing::debug!(backend = %kind, data_dir = %data_dir.display(), "opened state store");
        Ok(store)
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            AnyStateStore::Sqlite(_) => StorageKind::Sqlite,
            AnyStateStore::Json(_) => StorageKind::Json,
        }
    }
}

impl StateStore for AnyStateStore {
    async fn save_state(
        &self,
        workflow_id: &str,
        state: &StateSnapshot,
        version: i64,
    ) -> Result<(), RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.save_state(workflow_id, state, version).await,
            AnyStateStore::Json(s) => s.save_state(workflow_id, state, version).await,
        }
    }

    async fn load_state(&self, workflow_id: &str) -> Result<StateSnapshot, RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.load_state(workflow_id).await,
            AnyStateStore::Json(s) => s.load_state(workflow_id).await,
        }
    }

    async fn load_version(&self, workflow_id: &str) -> Result<Option<i64>, RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.load_version(workflow_id).await,
            AnyStateStore::Json(s) => s.load_version(workflow_id).await,
        }
    }

    async fn log_step(&self, entry: &StepLogEntry) -> Result<(), RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.log_step(entry).await,
            AnyStateStore::Json(s) => s.log_step(entry).await,
        }
    }

    async fn get_logs(&self, workflow_id: &str) -> Result<Vec<StepLogEntry>, RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.get_logs(workflow_id).await,
            AnyStateStore::Json(s) => s.get_logs(workflow_id).await,
        }
    }

    async fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        match self {
            AnyStateStore::Sqlite(s) => s.list_workflows().await,
            AnyStateStore::Json(s) => s.list_workflows().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_both_backends_roundtrip() {
        for kind in [StorageKind::Sqlite, StorageKind::Json] {
            let dir = tempfile::tempdir().unwrap();
            let store = AnyStateStore::open(kind, dir.path()).await.unwrap();
            assert_eq!(store.kind(), kind);

            let mut state = StateSnapshot::new();
            state.insert("x".to_string(), json!(1));
            store.save_state("wf", &state, 1).await.unwrap();

            assert_eq!(store.load_state("wf").await.unwrap(), state, "{kind}");
            assert!(store.load_state("unknown-id").await.unwrap().is_empty());
            assert_eq!(store.list_workflows().await.unwrap(), ["wf"]);
        }
    }
}
