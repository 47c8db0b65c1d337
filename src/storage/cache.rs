//! Local quote cache.
//!
//! The cache is the single source of truth for what the user sees. It holds
//! one JSON array of records under a well-known key (`savedQuotes` by
//! default). Loading never fails on bad content: anything that is not a
//! JSON array is replaced by an empty array and reported back to the
//! caller so it can warn the user.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Record;
use crate::storage::kv::KeyValueStore;

/// Default key the cache is stored under.
pub const DEFAULT_CACHE_KEY: &str = "savedQuotes";

/// Result of [`LocalCache::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheLoad {
    /// Records as persisted, in storage order.
    pub records: Vec<Record>,
    /// Set when the persisted content was unreadable and has been reset.
    pub reset: Option<String>,
}

/// Record cache on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocalCache {
    /// Create a cache using the default key.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_CACHE_KEY)
    }

    /// Create a cache stored under a custom key.
    pub fn with_key(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// The key this cache is persisted under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the cached records, healing corrupted content.
    ///
    /// Missing content is an empty cache. Content that does not parse as a
    /// JSON array is overwritten with `[]` and the reason is returned in
    /// [`CacheLoad::reset`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the backing store itself fails.
    pub fn load(&self) -> Result<CacheLoad> {
        match self.try_load() {
            Ok(records) => Ok(CacheLoad {
                records,
                reset: None,
            }),
            Err(Error::StorageCorrupted(reason)) => {
                warn!(key = %self.key, %reason, "local cache corrupted, resetting to empty");
                self.store.set(&self.key, "[]")?;
                Ok(CacheLoad {
                    records: Vec::new(),
                    reset: Some(reason),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Load the cached records without healing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageCorrupted`] if the content is not a JSON
    /// array, or a storage error if the backing store fails.
    pub fn try_load(&self) -> Result<Vec<Record>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::StorageCorrupted(format!("unparsable JSON: {e}")))?;

        let Value::Array(items) = value else {
            return Err(Error::StorageCorrupted(
                "stored value is not an array".to_string(),
            ));
        };

        Ok(records_from_values(items))
    }

    /// Replace the cached records.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, records: &[Record]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.store.set(&self.key, &json)
    }

    /// Look up a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.load()?.records.into_iter().find(|r| r.id == id))
    }

    /// Insert a record, or replace the one with the same id in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub fn upsert(&self, record: Record) -> Result<()> {
        let mut records = self.load()?.records;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save(&records)
    }

    /// Replace the record stored under `old_id` (for ids reassigned by the remote).
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub fn replace(&self, old_id: &str, record: Record) -> Result<()> {
        let mut records = self.load()?.records;
        records.retain(|r| r.id != record.id || r.id == old_id);
        match records.iter_mut().find(|r| r.id == old_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save(&records)
    }

    /// Remove a record. Returns true if something was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.load()?.records;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }
}

/// Decode JSON array items into records, skipping non-objects.
pub(crate) fn records_from_values(items: Vec<Value>) -> Vec<Record> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Record>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping non-record entry");
                None
            }
        })
        .collect()
}
