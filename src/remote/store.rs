//! Remote collection trait.
//!
//! Defines the interface the sync engine needs from the server side.
//! Uses async methods so HTTP implementations can suspend at I/O.

use crate::error::Result;
use crate::model::{Record, RecordPatch};

/// A remote collection of records reachable over an unreliable network.
///
/// Every method is bounded by the implementation's request timeout. A
/// timeout is reported exactly like any other network failure.
pub trait RemoteStore: Send + Sync {
    /// Fetch the full collection.
    ///
    /// Fails with [`crate::Error::Network`] on timeout, connection failure
    /// or a non-2xx status, and with [`crate::Error::Format`] when the body
    /// is not a JSON array.
    fn fetch_all(&self) -> impl std::future::Future<Output = Result<Vec<Record>>> + Send;

    /// Create a record. The remote may assign a new id.
    fn create(&self, record: &Record) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Apply a partial update to the record with `id`.
    fn update(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Delete the record with `id`.
    fn delete(&self, id: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Check whether the remote is reachable. Never fails.
    fn health_check(&self) -> impl std::future::Future<Output = bool> + Send;
}
