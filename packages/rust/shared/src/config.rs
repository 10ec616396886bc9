//! Application configuration for ThreadSync.
//!
//! User config lives at `~/.threadsync/threadsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadSyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "threadsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".threadsync";

// ---------------------------------------------------------------------------
// Config structs (matching threadsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sync behavior defaults.
    #[serde(default)]
    pub sync: SyncDefaultsConfig,

    /// Document/tabular store API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Target store table identifiers.
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification gateway settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Source documents to scan for annotations.
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDefaultsConfig {
    /// Fixed delay between consecutive record writes, in ms.
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,

    /// Number of backlog entries embedded verbatim in a created work item.
    #[serde(default = "default_backlog_preview")]
    pub backlog_preview: usize,
}

impl Default for SyncDefaultsConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: default_write_delay_ms(),
            backlog_preview: default_backlog_preview(),
        }
    }
}

fn default_write_delay_ms() -> u64 {
    350
}
fn default_backlog_preview() -> usize {
    10
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the document store API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API token (never the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// API version header value sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            api_version: default_api_version(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.notion.com".into()
}
fn default_token_env() -> String {
    "THREADSYNC_API_TOKEN".into()
}
fn default_api_version() -> String {
    "2022-06-28".into()
}

/// `[store]` section — identifiers of the target tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Table (database) receiving one record per accepted thread.
    #[serde(default)]
    pub records_table: String,

    /// Table holding aggregate work items.
    #[serde(default)]
    pub work_items_table: String,
}

/// `[notify]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Mail gateway endpoint receiving `{subject, body_markdown, body_html}`.
    /// Notifications are skipped entirely when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,

    /// Recipient address forwarded to the gateway.
    #[serde(default)]
    pub recipient: String,
}

/// `[[documents]]` entry — a source document registered for scanning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Store-assigned document (page) identifier.
    pub id: String,
    /// Human-readable name used in reports and rendered records.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Sync config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime sync configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed delay between consecutive record writes.
    pub write_delay: std::time::Duration,
    /// Backlog entries embedded verbatim in a created work item.
    pub backlog_preview: usize,
    /// Skip writes, status flips, and the task guard.
    pub dry_run: bool,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            write_delay: std::time::Duration::from_millis(config.sync.write_delay_ms),
            backlog_preview: config.sync.backlog_preview,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.threadsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ThreadSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.threadsync/threadsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ThreadSyncError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ThreadSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ThreadSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ThreadSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ThreadSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API token from the env var named in config.
pub fn resolve_api_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.api.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ThreadSyncError::config(format!(
            "API token not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the config names both target tables and at least one document.
pub fn validate_sync_targets(config: &AppConfig) -> Result<()> {
    if config.store.records_table.is_empty() {
        return Err(ThreadSyncError::config(
            "store.records_table is not configured",
        ));
    }
    if config.store.work_items_table.is_empty() {
        return Err(ThreadSyncError::config(
            "store.work_items_table is not configured",
        ));
    }
    if config.documents.is_empty() {
        return Err(ThreadSyncError::config(
            "no [[documents]] entries configured",
        ));
    }
    Ok(())
}
