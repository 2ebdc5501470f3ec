//! Global configuration loader for SmartFlow.
//!
//! Reads `smartflow.toml` from the data directory (`~/.smartflow/` by
//! default) into [`GlobalConfig`], then applies environment overrides. Falls
//! back to defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;
use smartflow_types::config::{GlobalConfig, StorageKind};
use smartflow_types::llm::ProviderType;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "smartflow.toml";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SMARTFLOW_DATA_DIR";

/// Resolve the data directory.
///
/// Priority:
/// 1. `SMARTFLOW_DATA_DIR` environment variable
/// 2. `~/.smartflow`
/// 3. `./.smartflow`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".smartflow");
    }

    PathBuf::from(".smartflow")
}

/// Load `{data_dir}/smartflow.toml` and apply environment overrides.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let mut config = read_config_file(data_dir).await;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// Parse the config file only.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: a warning, then defaults.
pub async fn read_config_file(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Apply `LLM_*`, `EMBEDDING_*`, `*_BASE_URL` and `STORAGE_TYPE` overrides.
///
/// `lookup` is the environment accessor; invalid values are logged and
/// ignored.
pub fn apply_env_overrides<F>(config: &mut GlobalConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = parse_var::<ProviderType, _>(&lookup, "LLM_PROVIDER") {
        config.llm.provider = provider;
    }
    if let Some(model) = lookup("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(url) = lookup("OPENAI_BASE_URL") {
        config.llm.openai_base_url = url;
    }
    if let Some(url) = lookup("OLLAMA_BASE_URL") {
        config.llm.ollama_base_url = url;
    }
    if let Some(provider) = parse_var::<ProviderType, _>(&lookup, "EMBEDDING_PROVIDER") {
        config.embedding.provider = provider;
    }
    if let Some(model) = lookup("EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Some(kind) = parse_var::<StorageKind, _>(&lookup, "STORAGE_TYPE") {
        config.storage.kind = kind;
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr<Err = String>,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, "ignoring invalid environment override: {err}");
            None
        }
    }
}

/// API credentials taken from the environment. Never logged.
#[derive(Default)]
pub struct Credentials {
    pub openai_api_key: Option<SecretString>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            openai_api_key: lookup("OPENAI_API_KEY")
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
