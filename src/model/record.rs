//! Quote record model.
//!
//! A [`Record`] is the unit of synchronization. The same JSON shape is
//! used on the wire and in the local cache:
//!
//! ```json
//! {"id":"1","text":"I think, therefore I am.","category":"Philosophy","author":"René Descartes","editable":false}
//! ```
//!
//! Decoding is deliberately forgiving. Fields may be missing or carry the
//! wrong JSON type; they decode to empty values and the record is later
//! rejected by [`crate::validate`] instead of failing the whole payload.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::{id_from_value, is_truthy, normalize_author, string_from_value};

/// A single quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRecord")]
pub struct Record {
    /// Stable identifier, unique within a collection snapshot.
    pub id: String,
    /// Quote text.
    pub text: String,
    /// Category used for filtering.
    pub category: String,
    /// Attribution; "Unknown" once normalized.
    pub author: String,
    /// Whether the quote was created by the user and may be edited or deleted.
    pub editable: bool,
}

/// Lenient decoding form of [`Record`].
///
/// Any JSON object decodes; non-objects do not.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    text: Value,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    author: Value,
    #[serde(default)]
    editable: Value,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        Self {
            id: id_from_value(&raw.id),
            text: string_from_value(&raw.text),
            category: string_from_value(&raw.category),
            author: string_from_value(&raw.author),
            editable: is_truthy(&raw.editable),
        }
    }
}

impl Record {
    /// Create a new user-authored quote with a locally generated id.
    ///
    /// User-authored quotes are always editable.
    pub fn new(text: &str, category: &str, author: Option<&str>) -> Self {
        let id = format!("q_{}", &uuid::Uuid::new_v4().to_string()[..12]);
        Self {
            id,
            text: text.trim().to_string(),
            category: category.trim().to_string(),
            author: normalize_author(author.unwrap_or_default()),
            editable: true,
        }
    }

    /// Return a copy with the patch applied.
    #[must_use]
    pub fn patched(&self, patch: &RecordPatch) -> Self {
        let mut out = self.clone();
        if let Some(text) = &patch.text {
            out.text.clone_from(text);
        }
        if let Some(category) = &patch.category {
            out.category.clone_from(category);
        }
        if let Some(author) = &patch.author {
            out.author.clone_from(author);
        }
        if let Some(editable) = patch.editable {
            out.editable = editable;
        }
        out
    }

    /// Case-insensitive match against text, author and category.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        self.text.to_lowercase().contains(&needle)
            || self.author.to_lowercase().contains(&needle)
            || self.category.to_lowercase().contains(&needle)
    }
}

/// Partial update for a record.
///
/// Only the fields that are `Some` are sent to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
}

impl RecordPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.category.is_none()
            && self.author.is_none()
            && self.editable.is_none()
    }

    /// Patch carrying every tracked field of `record`.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            text: Some(record.text.clone()),
            category: Some(record.category.clone()),
            author: Some(record.author.clone()),
            editable: Some(record.editable),
        }
    }
}

/// Distinct categories in first-seen order.
#[must_use]
pub fn categories(records: &[Record]) -> Vec<String> {
    let mut seen = Vec::new();
    for record in records {
        if !seen.contains(&record.category) {
            seen.push(record.category.clone());
        }
    }
    seen
}

/// Records in `category`; `"all"` (any case) selects everything.
#[must_use]
pub fn filter_by_category<'a>(records: &'a [Record], category: &str) -> Vec<&'a Record> {
    if category.eq_ignore_ascii_case("all") {
        return records.iter().collect();
    }
    records.iter().filter(|r| r.category == category).collect()
}

/// A random record from `category` and its index in the filtered list.
///
/// `skip_id` (the quote currently on screen) is avoided unless it is the
/// only candidate.
#[must_use]
pub fn pick_random<'a, R: Rng + ?Sized>(
    records: &'a [Record],
    category: &str,
    skip_id: Option<&str>,
    rng: &mut R,
) -> Option<(usize, &'a Record)> {
    let visible = filter_by_category(records, category);
    let fresh: Vec<usize> = (0..visible.len())
        .filter(|&i| Some(visible[i].id.as_str()) != skip_id)
        .collect();
    let pool = if fresh.is_empty() {
        (0..visible.len()).collect()
    } else {
        fresh
    };
    let &index = pool.choose(rng)?;
    Some((index, visible[index]))
}
