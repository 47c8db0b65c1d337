//! Data models for Quote Sync.
//!
//! - [`Record`] and [`RecordPatch`] - the synchronized quote and its partial update
//! - [`Conflict`] - a same-id disagreement found during a merge

pub mod conflict;
pub mod record;

pub use conflict::{Conflict, ConflictFields, Resolution};
pub use record::{Record, RecordPatch, categories, filter_by_category, pick_random};
