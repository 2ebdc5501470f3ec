//! Flat-file JSON state and telemetry store.
//!
//! Two files in one directory:
//! - `smartflow_state.json`: object keyed by workflow id, each value a
//!   `{state_data, version, created_at, updated_at}` record
//! - `smartflow_logs.json`: array of log entries in insertion order
//!
//! Every call reads the whole file, modifies it, and writes it back. Writes
//! go through a temp file and a rename so a crash never leaves half a file.
//! Handles opened on the same directory share one lock, so read-modify-write
//! cycles within a process never interleave.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use smartflow_core::repository::state::StateStore;
use smartflow_types::error::RepositoryError;
use smartflow_types::state::{StateRecord, StateSnapshot, StepLogEntry};
use tokio::sync::Mutex;

pub const STATE_FILE: &str = "smartflow_state.json";
pub const LOG_FILE: &str = "smartflow_logs.json";

type StateFile = BTreeMap<String, StateRecord>;

static DIR_LOCKS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

/// The lock shared by every handle on `dir` (already canonicalized).
fn dir_lock(dir: &Path) -> Arc<Mutex<()>> {
    let mut locks = DIR_LOCKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(dir.to_path_buf()).or_default())
}

/// JSON-file-backed implementation of `StateStore`.
#[derive(Clone)]
pub struct JsonStateStore {
    state_path: PathBuf,
    log_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonStateStore {
    /// Open the store in `dir`, creating the directory and empty files when
    /// missing.
    pub async fn open(dir: &Path) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(dir).await?;
        let canonical = tokio::fs::canonicalize(dir).await?;
        let store = Self {
            state_path: canonical.join(STATE_FILE),
            log_path: canonical.join(LOG_FILE),
            lock: dir_lock(&canonical),
        };

        let guard = store.lock.lock().await;
        if !tokio::fs::try_exists(&store.state_path).await? {
            write_json(&store.state_path, &StateFile::new()).await?;
        }
        if !tokio::fs::try_exists(&store.log_path).await? {
            write_json(&store.log_path, &Vec::<StepLogEntry>::new()).await?;
        }

        drop(guard);

        tracing::debug!(dir = %dir.display(), "opened JSON state store");
        Ok(store)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// The stored snapshot with its bookkeeping fields.
    pub async fn load_record(
        &self,
        workflow_id: &str,
    ) -> Result<Option<StateRecord>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut states: StateFile = read_json(&self.state_path).await?;
        Ok(states.remove(workflow_id))
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, RepositoryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

impl StateStore for JsonStateStore {
    async fn save_state(
        &self,
        workflow_id: &str,
        state: &StateSnapshot,
        version: i64,
    ) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut states: StateFile = read_json(&self.state_path).await?;
        let now = Utc::now();
        let created_at = states
            .get(workflow_id)
            .map(|record| record.created_at)
            .unwrap_or(now);

        states.insert(
            workflow_id.to_string(),
            StateRecord {
                state_data: state.clone(),
                version,
                created_at,
                updated_at: now,
            },
        );
        write_json(&self.state_path, &states).await?;

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
        Ok(self.load_record(workflow_id).await?.map(|record| record.version))
    }

    async fn log_step(&self, entry: &StepLogEntry) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut logs: Vec<StepLogEntry> = read_json(&self.log_path).await?;
        logs.push(entry.clone());
        write_json(&self.log_path, &logs).await
    }

    async fn get_logs(&self, workflow_id: &str) -> Result<Vec<StepLogEntry>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let logs: Vec<StepLogEntry> = read_json(&self.log_path).await?;
        Ok(logs
            .into_iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .collect())
    }

    async fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let states: StateFile = read_json(&self.state_path).await?;
        Ok(states.into_keys().collect())
    }
}
