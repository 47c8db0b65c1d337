//! Command implementations.

pub mod completions;
pub mod config;
pub mod health;
pub mod queue;
pub mod quotes;
pub mod sync;
pub mod version;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{SyncConfig, load_config, resolve_db_path};
use crate::error::{Error, Result};
use crate::remote::HttpRemoteStore;
use crate::storage::{KeyValueStore, LocalCache, SqliteKvStore};
use crate::sync::{RequestQueue, SyncObserver, SyncOrchestrator};

/// Effective settings: config file, environment, then `--server`.
pub(crate) fn load_settings(server: Option<&str>) -> Result<SyncConfig> {
    let mut config = load_config()?;
    if let Some(url) = server {
        config.server_url = url.trim().to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Open (creating if needed) the local database.
pub(crate) fn open_store(db_path: Option<&PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    let path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine database path".into()))?;
    Ok(Arc::new(SqliteKvStore::open(&path)?))
}

pub(crate) fn open_cache(store: Arc<dyn KeyValueStore>, config: &SyncConfig) -> LocalCache {
    LocalCache::with_key(store, &config.cache_key)
}

pub(crate) fn open_remote(config: &SyncConfig) -> Result<HttpRemoteStore> {
    HttpRemoteStore::with_timeout(&config.server_url, config.request_timeout())
}

/// Wire the orchestrator from settings.
pub(crate) fn build_orchestrator(
    store: Arc<dyn KeyValueStore>,
    config: &SyncConfig,
    observer: Arc<dyn SyncObserver>,
) -> Result<SyncOrchestrator<HttpRemoteStore>> {
    let remote = open_remote(config)?;
    let queue = RequestQueue::with_policy(config.queue_persistence, store.clone())?;
    Ok(
        SyncOrchestrator::new(remote, open_cache(store, config), queue)
            .with_policy(config.retry_policy())
            .with_observer(observer),
    )
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
