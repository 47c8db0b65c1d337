//! Last-viewed quote, remembered between invocations.
//!
//! Stored in the key-value store under [`VIEW_STATE_KEY`] with a
//! millisecond timestamp. Entries older than two hours are stale: reading
//! one removes it and reports nothing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::Record;
use crate::storage::KeyValueStore;

/// Key the view state lives under.
pub const VIEW_STATE_KEY: &str = "currentQuote";

/// View state TTL: 2 hours.
const VIEW_STATE_TTL_MS: u64 = 2 * 60 * 60 * 1000;

/// The quote on screen and the filter it was reached through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// Position of the quote in the filtered list.
    pub index: usize,
    pub quote: Record,
    /// Active category filter (`all` for none).
    pub category: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ViewState {
    /// Create a view state stamped with the current time.
    #[must_use]
    pub fn new(index: usize, quote: Record, category: &str) -> Self {
        Self {
            index,
            quote,
            category: category.to_string(),
            timestamp: now_ms(),
        }
    }

    /// Whether the entry is older than the TTL at `now` (ms).
    #[must_use]
    pub fn is_stale_at(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > VIEW_STATE_TTL_MS
    }
}

fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Read the view state.
///
/// Returns `None` if nothing is stored, the entry is stale or it cannot be
/// parsed. Stale and unparsable entries are removed.
///
/// # Errors
///
/// Returns an error if the store itself fails.
pub fn read_view_state(store: &dyn KeyValueStore) -> Result<Option<ViewState>> {
    let Some(raw) = store.get(VIEW_STATE_KEY)? else {
        return Ok(None);
    };

    let state = match serde_json::from_str::<ViewState>(&raw) {
        Ok(state) if !state.is_stale_at(now_ms()) => state,
        Ok(_) => {
            debug!("view state expired");
            store.remove(VIEW_STATE_KEY)?;
            return Ok(None);
        }
        Err(e) => {
            debug!(error = %e, "discarding unreadable view state");
            store.remove(VIEW_STATE_KEY)?;
            return Ok(None);
        }
    };

    Ok(Some(state))
}

/// Store the view state.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_view_state(store: &dyn KeyValueStore, state: &ViewState) -> Result<()> {
    let json = serde_json::to_string(state)?;
    store.set(VIEW_STATE_KEY, &json)
}

/// Forget the view state.
///
/// # Errors
///
/// Returns an error if the store cannot be written.
pub fn clear_view_state(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(VIEW_STATE_KEY)
}
