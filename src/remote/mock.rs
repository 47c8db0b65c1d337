//! Scripted in-memory remote for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::model::{Record, RecordPatch};

use super::store::RemoteStore;

/// In-memory collection with switchable failures and call recording.
#[derive(Default)]
pub struct MockRemote {
    records: Mutex<Vec<Record>>,
    health_script: Mutex<VecDeque<bool>>,
    unhealthy: AtomicBool,
    fail_fetch: AtomicBool,
    bad_format: AtomicBool,
    fail_writes: AtomicBool,
    next_id: AtomicU64,
    pub health_checks: AtomicUsize,
    pub fetches: AtomicUsize,
    pub created: Mutex<Vec<Record>>,
    pub updated: Mutex<Vec<(String, RecordPatch)>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockRemote {
    pub fn with_records(records: Vec<Record>) -> Self {
        let mock = Self::default();
        *mock.records.lock().unwrap() = records;
        mock
    }

    /// Health results to return before falling back to the healthy flag.
    pub fn script_health(&self, results: &[bool]) {
        self.health_script.lock().unwrap().extend(results);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_bad_format(&self, bad: bool) {
        self.bad_format.store(bad, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `create` assign ids starting at `first` instead of echoing.
    pub fn assign_ids_from(&self, first: u64) {
        self.next_id.store(first, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for MockRemote {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Network("HTTP status 503".to_string()));
        }
        if self.bad_format.load(Ordering::SeqCst) {
            return Err(Error::Format("expected an array of quotes, got an object".to_string()));
        }
        Ok(self.records())
    }

    async fn create(&self, record: &Record) -> Result<Record> {
        self.check_writes()?;
        let mut created = record.clone();
        let next = self.next_id.load(Ordering::SeqCst);
        if next > 0 {
            created.id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        }
        self.records.lock().unwrap().push(created.clone());
        self.created.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, patch: &RecordPatch) -> Result<Record> {
        self.check_writes()?;
        self.updated
            .lock()
            .unwrap()
            .push((id.to_string(), patch.clone()));
        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::Network("HTTP status 404".to_string()))?;
        *existing = existing.patched(patch);
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_writes()?;
        self.deleted.lock().unwrap().push(id.to_string());
        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.health_script.lock().unwrap().pop_front() {
            return result;
        }
        !self.unhealthy.load(Ordering::SeqCst)
    }
}
