//! Merge engine.
//!
//! Reconciles the local cache with a freshly fetched remote collection.
//! The policy is server-wins at whole-record granularity: when both sides
//! hold an id, the server record is the output value and any difference in
//! `text`, `category` or `author` is reported as a [`Conflict`].
//!
//! Output order is server records (in response order) followed by
//! local-only records (in cache order). Callers should not rely on it
//! beyond display.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::model::{Conflict, Record};
use crate::validate::normalize;

/// Result of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// The reconciled collection.
    pub merged: Vec<Record>,
    /// Same-id disagreements, in server order.
    pub conflicts: Vec<Conflict>,
}

impl MergeOutcome {
    /// Records in `merged` whose id is not in `server_ids`.
    pub fn local_only<'a>(
        &'a self,
        server_ids: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.merged.iter().filter(|r| !server_ids.contains(&r.id))
    }
}

/// Validate, normalize and de-duplicate one side of the merge.
///
/// The first record for a given id wins.
#[must_use]
pub fn prepare(records: &[Record]) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(normalize)
        .filter(|r| {
            let fresh = seen.insert(r.id.clone());
            if !fresh {
                debug!(id = %r.id, "dropping duplicate id");
            }
            fresh
        })
        .collect()
}

/// Ids of the valid records in `records`.
#[must_use]
pub fn valid_ids(records: &[Record]) -> HashSet<String> {
    prepare(records).into_iter().map(|r| r.id).collect()
}

/// Merge local and server records. Pure: neither input is modified.
#[must_use]
pub fn merge(local: &[Record], server: &[Record]) -> MergeOutcome {
    let local = prepare(local);
    let server = prepare(server);

    let server_ids: HashSet<&str> = server.iter().map(|r| r.id.as_str()).collect();
    let local_by_id: HashMap<&str, &Record> = local.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut merged = Vec::with_capacity(server.len() + local.len());
    let mut conflicts = Vec::new();

    for server_record in &server {
        if let Some(local_record) = local_by_id.get(server_record.id.as_str()) {
            if let Some(conflict) = Conflict::detect(local_record, server_record) {
                debug!(id = %conflict.id, fields = ?conflict.fields.names(), "conflict");
                conflicts.push(conflict);
            }
        }
        merged.push(server_record.clone());
    }

    merged.extend(
        local
            .iter()
            .filter(|r| !server_ids.contains(r.id.as_str()))
            .cloned(),
    );

    MergeOutcome { merged, conflicts }
}
