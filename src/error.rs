//! Error types for Quote Sync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Transience flags that drive the sync retry loop
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for Quote Sync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    DatabaseError,
    StorageCorrupted,

    // Not Found (exit 3)
    RecordNotFound,

    // Validation (exit 4)
    InvalidRecord,
    InvalidArgument,
    NotEditable,

    // Sync state (exit 5)
    SyncInProgress,

    // Remote (exit 6)
    NetworkError,
    FormatError,
    SyncFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::StorageCorrupted => "STORAGE_CORRUPTED",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::InvalidRecord => "INVALID_RECORD",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotEditable => "NOT_EDITABLE",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::NetworkError => "NETWORK_ERROR",
            Self::FormatError => "FORMAT_ERROR",
            Self::SyncFailed => "SYNC_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::StorageCorrupted => 2,
            Self::RecordNotFound => 3,
            Self::InvalidRecord | Self::InvalidArgument | Self::NotEditable => 4,
            Self::SyncInProgress => 5,
            Self::NetworkError | Self::FormatError | Self::SyncFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the failure is transient and the operation may succeed later.
    ///
    /// Network and format failures are indistinguishable from a bad
    /// moment on the remote, so both count as transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::FormatError | Self::SyncFailed | Self::SyncInProgress
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Quote Sync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response format: {0}")]
    Format(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Local cache corrupted: {0}")]
    StorageCorrupted(String),

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Sync failed after {attempts} attempt(s): {reason}")]
    SyncFailed { attempts: u32, reason: String },

    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Record is read-only: {id}")]
    NotEditable { id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Format(err.to_string())
        } else if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Format(_) => ErrorCode::FormatError,
            Self::InvalidRecord(_) => ErrorCode::InvalidRecord,
            Self::StorageCorrupted(_) => ErrorCode::StorageCorrupted,
            Self::SyncInProgress => ErrorCode::SyncInProgress,
            Self::SyncFailed { .. } => ErrorCode::SyncFailed,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::NotEditable { .. } => ErrorCode::NotEditable,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether a sync pass should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Format(_))
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Network(_) | Self::SyncFailed { .. } => Some(
                "The server is unreachable. Check `qs health` or the `serverUrl` \
                 setting (`qs config show`)."
                    .to_string(),
            ),
            Self::Format(_) => Some(
                "The server did not return a list of quotes. Is `serverUrl` pointing \
                 at the collection endpoint?"
                    .to_string(),
            ),
            Self::RecordNotFound { id } => Some(format!(
                "No quote with ID '{id}' in the local cache. Use `qs list` or run `qs sync`."
            )),
            Self::NotEditable { id } => Some(format!(
                "Quote '{id}' was not created locally and cannot be changed."
            )),
            Self::SyncInProgress => {
                Some("Another sync pass is running. Try again when it finishes.".to_string())
            }
            Self::StorageCorrupted(_) => Some(
                "The cache will be reset to empty on the next load; run `qs sync` to refill it."
                    .to_string(),
            ),
            Self::InvalidRecord(_) => {
                Some("Quote text and category must both be non-empty.".to_string())
            }
            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
