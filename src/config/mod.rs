//! Configuration management.
//!
//! Resolves the Quote Sync directories, the database path and the sync
//! settings.
//!
//! # Layout
//!
//! - **Config**: `~/.quotesync/config.json` (override with `QUOTESYNC_CONFIG`)
//! - **Database**: `~/.quotesync/data/quotes.db` (override with `--db` or `QUOTESYNC_DB`)
//!
//! Settings resolve as: CLI flag > environment > config file > default.

mod view_state;

pub use view_state::{VIEW_STATE_KEY, ViewState, clear_view_state, read_view_state, write_view_state};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::DEFAULT_CACHE_KEY;
use crate::sync::{
    DEFAULT_AUTO_SYNC_INTERVAL, DEFAULT_BASE_DELAY, DEFAULT_HEALTH_POLL_INTERVAL,
    DEFAULT_MAX_RETRIES, QueuePersistence, RetryPolicy,
};

/// Collection endpoint used when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000/quotes";

const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Sync settings as stored in `config.json`.
///
/// Every field is optional in the file; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub auto_sync_interval_secs: u64,
    pub health_poll_interval_secs: u64,
    pub queue_persistence: QueuePersistence,
    pub cache_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_ms: millis(DEFAULT_BASE_DELAY),
            auto_sync_interval_secs: DEFAULT_AUTO_SYNC_INTERVAL.as_secs(),
            health_poll_interval_secs: DEFAULT_HEALTH_POLL_INTERVAL.as_secs(),
            queue_persistence: QueuePersistence::default(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl SyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_retry_delay_ms))
    }

    #[must_use]
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    #[must_use]
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    /// Apply `QUOTESYNC_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric variable does not parse.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("QUOTESYNC_SERVER_URL") {
            self.server_url = url.trim().to_string();
        }
        if let Some(raw) = var("QUOTESYNC_TIMEOUT_MS") {
            self.request_timeout_ms = parse_env("QUOTESYNC_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = var("QUOTESYNC_MAX_RETRIES") {
            self.max_retries = parse_env("QUOTESYNC_MAX_RETRIES", &raw)?;
        }
        Ok(())
    }

    /// Set one field by its file name (`maxRetries`, `serverUrl`, ...).
    ///
    /// Numeric fields must parse as non-negative integers; everything else
    /// is taken as a string and must deserialize into the field's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown key or a value the field
    /// does not accept.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut doc = serde_json::to_value(&*self)?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(Error::Other("config did not serialize to an object".into()));
        };
        let current = fields
            .get(key)
            .ok_or_else(|| Error::Config(format!("Unknown setting '{key}'")))?;

        let next = if current.is_number() {
            serde_json::Value::from(parse_env::<u64>(key, value)?)
        } else {
            serde_json::Value::from(value.trim())
        };
        fields.insert(key.to_string(), next);

        *self = serde_json::from_value(doc)
            .map_err(|e| Error::Config(format!("Invalid value for '{key}': {e}")))?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(Error::Config("serverUrl must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("requestTimeoutMs must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("maxRetries must be at least 1".into()));
        }
        if self.cache_key.trim().is_empty() {
            return Err(Error::Config("cacheKey must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
}

/// Get the global Quote Sync directory (`~/.quotesync`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".quotesync"))
}

/// Path of the config file.
///
/// # Errors
///
/// Returns [`Error::Config`] if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("QUOTESYNC_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    global_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the config file and apply environment overrides.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or
/// parsed, or an override is malformed.
pub fn load_config() -> Result<SyncConfig> {
    let mut config = load_config_from(&config_path()?)?;
    config.apply_env()?;
    Ok(config)
}

/// Load a config file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the config to the default location.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_config(config: &SyncConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Save the config as pretty JSON, creating the parent directory.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_config_to(path: &Path, config: &SyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` (the `--db` flag)
/// 2. `QUOTESYNC_DB` environment variable
/// 3. `~/.quotesync/data/quotes.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("QUOTESYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_dir().map(|dir| dir.join("data").join("quotes.db"))
}
