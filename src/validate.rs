//! Record validation and normalization.
//!
//! Records arrive from two untrusted places: the persisted local cache and
//! the remote collection. Both are decoded leniently (see
//! [`crate::model::Record`]) and then pass through here before they can
//! take part in a merge:
//!
//! - `text` and `category` are trimmed and must be non-empty
//! - `id` must be non-empty
//! - `author` is trimmed and defaults to [`DEFAULT_AUTHOR`]
//! - `editable` is coerced from loose JSON values (see [`is_truthy`])

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::Record;

/// Author used when a record carries none.
pub const DEFAULT_AUTHOR: &str = "Unknown";

/// Check the invariants a record must hold to be merged or persisted.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] naming the first offending field.
pub fn validate_record(record: &Record) -> Result<()> {
    if record.id.trim().is_empty() {
        return Err(Error::InvalidRecord("missing id".to_string()));
    }
    if record.text.trim().is_empty() {
        return Err(Error::InvalidRecord(format!("{}: text is empty", record.id)));
    }
    if record.category.trim().is_empty() {
        return Err(Error::InvalidRecord(format!(
            "{}: category is empty",
            record.id
        )));
    }
    Ok(())
}

/// Return a trimmed copy with the author defaulted.
///
/// Does not validate; pair with [`validate_record`] or use [`normalize`].
#[must_use]
pub fn normalized(record: &Record) -> Record {
    Record {
        id: record.id.trim().to_string(),
        text: record.text.trim().to_string(),
        category: record.category.trim().to_string(),
        author: normalize_author(&record.author),
        editable: record.editable,
    }
}

/// Validate and normalize in one step.
///
/// Returns `None` for records that must be dropped. Drops are logged at
/// debug level only.
#[must_use]
pub fn normalize(record: &Record) -> Option<Record> {
    match validate_record(record) {
        Ok(()) => Some(normalized(record)),
        Err(e) => {
            tracing::debug!(error = %e, "dropping invalid record");
            None
        }
    }
}

/// Trim an author name, falling back to [`DEFAULT_AUTHOR`] when blank.
#[must_use]
pub fn normalize_author(author: &str) -> String {
    let trimmed = author.trim();
    if trimmed.is_empty() {
        DEFAULT_AUTHOR.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Loose truthiness of a JSON value.
///
/// `null`, `false`, `0`, `NaN` and `""` are falsy; everything else,
/// including empty arrays and objects, is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a JSON id as a string.
///
/// Strings pass through, integers are printed in decimal. Anything else
/// is treated as missing.
#[must_use]
pub fn id_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        _ => String::new(),
    }
}

/// Take a string field, treating non-strings as missing.
#[must_use]
pub fn string_from_value(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_default()
}
