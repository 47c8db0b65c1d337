//! Remote collection client.
//!
//! ```text
//! ┌──────────────────┐
//! │ SyncOrchestrator │
//! └────────┬─────────┘
//!          │ RemoteStore
//!          ▼
//! ┌─────────────────┐
//! │ HttpRemoteStore │  ← reqwest, bounded timeout
//! └────────┬────────┘
//!          ▼
//!   GET/POST/PATCH/DELETE/HEAD /<collection>
//! ```

pub mod http;
pub mod store;

#[cfg(test)]
pub mod mock;

pub use http::{DEFAULT_TIMEOUT, HttpRemoteStore};
pub use store::RemoteStore;
