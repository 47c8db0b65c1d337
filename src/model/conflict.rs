//! Sync conflicts.
//!
//! A conflict is produced when the local cache and the remote hold the same
//! id with different tracked fields. Conflicts live for a single sync pass:
//! they are handed to the observer and then dropped.

use serde::Serialize;

use super::record::Record;

/// Which tracked fields differ between the two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflictFields {
    pub text: bool,
    pub category: bool,
    pub author: bool,
}

impl ConflictFields {
    /// Compare the tracked fields of two records.
    #[must_use]
    pub fn between(local: &Record, server: &Record) -> Self {
        Self {
            text: local.text != server.text,
            category: local.category != server.category,
            author: local.author != server.author,
        }
    }

    /// Returns true if at least one field differs.
    #[must_use]
    pub fn any(&self) -> bool {
        self.text || self.category || self.author
    }

    /// Names of the differing fields, in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.text {
            names.push("text");
        }
        if self.category {
            names.push("category");
        }
        if self.author {
            names.push("author");
        }
        names
    }
}

/// A same-id pair whose tracked fields disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub id: String,
    /// The version that was in the local cache (overwritten by the merge).
    pub local: Record,
    /// The remote version (kept by the merge).
    pub server: Record,
    pub fields: ConflictFields,
}

impl Conflict {
    /// Build a conflict if the records differ in any tracked field.
    #[must_use]
    pub fn detect(local: &Record, server: &Record) -> Option<Self> {
        let fields = ConflictFields::between(local, server);
        fields.any().then(|| Self {
            id: server.id.clone(),
            local: local.clone(),
            server: server.clone(),
            fields,
        })
    }
}

/// Manual resolution chosen for a conflict after the automatic merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    /// Keep what the merge already applied.
    #[default]
    KeepServer,
    /// Restore the local version and send it to the remote.
    KeepLocal,
}
