//! SQLite state and telemetry store.
//!
//! Implements `StateStore` from `smartflow-core`. Snapshots live in
//! `workflow_state` (one upserted row per workflow id); telemetry is appended
//! to `step_logs`. JSON payloads are stored as text, timestamps as RFC 3339.

use chrono::{DateTime, Utc};
use smartflow_core::repository::state::StateStore;
use smartflow_types::error::RepositoryError;
use smartflow_types::state::{StateRecord, StateSnapshot, StepLogEntry};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `StateStore`.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DatabasePool,
}

impl SqliteStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// The stored snapshot with its bookkeeping columns.
    pub async fn load_record(
        &self,
        workflow_id: &str,
    ) -> Result<Option<StateRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state_data, version, created_at, updated_at FROM workflow_state WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let state_row =
                    StateRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(state_row.into_record()?))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct StateRow {
    state_data: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl StateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            state_data: row.try_get("state_data")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<StateRecord, RepositoryError> {
        Ok(StateRecord {
            state_data: parse_json(&self.state_data)?,
            version: self.version,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct LogRow {
    workflow_id: String,
    step_id: String,
    substep_id: String,
    input_data: String,
    output_data: String,
    prompt: String,
    retrieval_context: String,
    timestamp: String,
    latency: f64,
    input_tokens: i64,
    output_tokens: i64,
    success_status: bool,
    quality_score: f64,
    evaluation_explanation: String,
}

impl LogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            step_id: row.try_get("step_id")?,
            substep_id: row.try_get("substep_id")?,
            input_data: row.try_get("input_data")?,
            output_data: row.try_get("output_data")?,
            prompt: row.try_get("prompt")?,
            retrieval_context: row.try_get("retrieval_context")?,
            timestamp: row.try_get("timestamp")?,
            latency: row.try_get("latency")?,
            input_tokens: row.try_get("input_tokens")?,
            output_tokens: row.try_get("output_tokens")?,
            success_status: row.try_get("success_status")?,
            quality_score: row.try_get("quality_score")?,
            evaluation_explanation: row.try_get("evaluation_explanation")?,
        })
    }

    fn into_entry(self) -> Result<StepLogEntry, RepositoryError> {
        Ok(StepLogEntry {
            workflow_id: self.workflow_id,
            step_id: self.step_id,
            substep_id: self.substep_id,
            input_data: parse_json(&self.input_data)?,
            output_data: parse_json(&self.output_data)?,
            prompt: self.prompt,
            retrieval_context: self.retrieval_context,
            timestamp: parse_datetime(&self.timestamp)?,
            latency: self.latency,
            input_tokens: u32::try_from(self.input_tokens).unwrap_or(0),
            output_tokens: u32::try_from(self.output_tokens).unwrap_or(0),
            success_status: self.success_status,
            quality_score: self.quality_score,
            evaluation_explanation: self.evaluation_explanation,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid JSON value: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))
}

// ---------------------------------------------------------------------------
// StateStore implementation
// ---------------------------------------------------------------------------

impl StateStore for SqliteStateStore {
    async fn save_state(
        &self,
        workflow_id: &str,
        state: &StateSnapshot,
        version: i64,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let state_data = to_json(state)?;

        sqlx::query(
            r#"INSERT INTO workflow_state (workflow_id, state_data, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (workflow_id) DO UPDATE SET
                   state_data = excluded.state_data,
                   version = excluded.version,
                   updated_at = excluded.updated_at"#,
        )
        .bind(workflow_id)
        .bind(&state_data)
        .bind(version)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(workflow_id, version, "saved workflow state");
        Ok(())
    }

    async fn load_state(&self, workflow_id: &str) -> Result<StateSnapshot, RepositoryError> {
        Ok(self
            .load_record(workflow_id)
            .await?
            .map(|record| record.state_data)
            .unwrap_or_default())
    }

    async fn load_version(&self, workflow_id: &str) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query("SELECT version FROM workflow_state WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| row.try_get::<i64, _>("version"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn log_step(&self, entry: &StepLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO step_logs (
                   workflow_id, step_id, substep_id, input_data, output_data, prompt,
                   retrieval_context, timestamp, latency, input_tokens, output_tokens,
                   success_status, quality_score, evaluation_explanation
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.workflow_id)
        .bind(&entry.step_id)
        .bind(&entry.substep_id)
        .bind(to_json(&entry.input_data)?)
        .bind(to_json(&entry.output_data)?)
        .bind(&entry.prompt)
        .bind(&entry.retrieval_context)
        .bind(format_datetime(&entry.timestamp))
        .bind(entry.latency)
        .bind(i64::from(entry.input_tokens))
        .bind(i64::from(entry.output_tokens))
        .bind(entry.success_status)
        .bind(entry.quality_score)
        .bind(&entry.evaluation_explanation)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_logs(&self, workflow_id: &str) -> Result<Vec<StepLogEntry>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM step_logs WHERE workflow_id = ? ORDER BY id")
            .bind(workflow_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                LogRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_entry()
            })
            .collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT workflow_id FROM workflow_state ORDER BY workflow_id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row
                .try_get("workflow_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::{DatabasePool, database_url};
    use serde_json::json;

    async fn test_store() -> (SqliteStateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        (SqliteStateStore::new(pool), dir)
    }

    fn entry(workflow_id: &str, substep_id: &str) -> StepLogEntry {
        StepLogEntry {
            workflow_id: workflow_id.to_string(),
            step_id: "analysis".to_string(),
            substep_id: substep_id.to_string(),
            input_data: json!({"input_data": "hello"}),
            output_data: json!({"result": "HELLO"}),
            prompt: "Classify: hello".to_string(),
            retrieval_context: "ctx".to_string(),
            timestamp: Utc::now(),
            latency: 0.25,
            input_tokens: 12,
            output_tokens: 4,
            success_status: true,
            quality_score: 0.8,
            evaluation_explanation: "Missing keywords: x".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let (store, _dir) = test_store().await;
        let mut state = StateSnapshot::new();
        state.insert("x".to_string(), json!(1));

        store.save_state("wf-1", &state, 1).await.unwrap();

        assert_eq!(store.load_state("wf-1").await.unwrap(), state);
        assert_eq!(store.load_version("wf-1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_load_unknown_is_empty() {
        let (store, _dir) = test_store().await;
        assert!(store.load_state("unknown-id").await.unwrap().is_empty());
        assert_eq!(store.load_version("unknown-id").await.unwrap(), None);
        assert!(store.load_record("unknown-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let (store, _dir) = test_store().await;
        let mut state = StateSnapshot::new();
        state.insert("a".to_string(), json!("first"));
        store.save_state("wf", &state, 1).await.unwrap();
        let first = store.load_record("wf").await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        state.insert("b".to_string(), json!("second"));
        store.save_state("wf", &state, 2).await.unwrap();
        let second = store.load_record("wf").await.unwrap().unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.version, 2);
        assert_eq!(second.state_data.len(), 2);
    }

    #[tokio::test]
    async fn test_logs_in_insertion_order() {
        let (store, _dir) = test_store().await;
        store.log_step(&entry("wf", "b")).await.unwrap();
        store.log_step(&entry("wf", "a")).await.unwrap();
        store.log_step(&entry("other", "c")).await.unwrap();
        store.log_step(&entry("wf", "")).await.unwrap();

        let logs = store.get_logs("wf").await.unwrap();
        let ids: Vec<&str> = logs.iter().map(|e| e.substep_id.as_str()).collect();
        assert_eq!(ids, ["b", "a", ""]);

        let first = &logs[0];
        assert_eq!(first.output_data, json!({"result": "HELLO"}));
        assert_eq!(first.input_tokens, 12);
        assert_eq!(first.output_tokens, 4);
        assert!(first.success_status);
        assert_eq!(first.quality_score, 0.8);
        assert_eq!(first.retrieval_context, "ctx");
    }

    #[tokio::test]
    async fn test_list_workflows() {
        let (store, _dir) = test_store().await;
        store.save_state("b", &StateSnapshot::new(), 1).await.unwrap();
        store.save_state("a", &StateSnapshot::new(), 1).await.unwrap();
        assert_eq!(store.list_workflows().await.unwrap(), ["a", "b"]);
    }
}
