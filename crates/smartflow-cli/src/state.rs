//! Application state shared by every command.
//!
//! Resolves the data directory, loads `smartflow.toml` plus environment
//! overrides, and opens the configured state store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use smartflow_infra::config::{Credentials, load_global_config, resolve_data_dir};
use smartflow_infra::store::AnyStateStore;
use smartflow_types::config::{GlobalConfig, StorageKind};

#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub credentials: Arc<Credentials>,
    pub store: AnyStateStore,
}

impl AppState {
    /// Initialize from the environment. `storage` overrides the configured
    /// backend.
    pub async fn init(storage: Option<StorageKind>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let mut config = load_global_config(&data_dir).await;
        if let Some(kind) = storage {
            config.storage.kind = kind;
        }
        Self::open(data_dir, config, Credentials::from_env()).await
    }

    /// Open the store under `data_dir` with an already-resolved config.
    pub async fn open(
        data_dir: PathBuf,
        config: GlobalConfig,
        credentials: Credentials,
    ) -> anyhow::Result<Self> {
        let store = AnyStateStore::open(config.storage.kind, &data_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to open {} storage in {}",
                    config.storage.kind,
                    data_dir.display()
                )
            })?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            storage = %config.storage.kind,
            provider = %config.llm.provider,
            "application state ready"
        );

        Ok(Self {
            data_dir,
            config,
            credentials: Arc::new(credentials),
            store,
        })
    }
}
