//! Sync engine error types.

use thiserror::Error;

/// Error type for the auth state sync engine.
///
/// Every storage-layer condition here is recovered locally: caught, logged,
/// and normalized to "absence of state". Nothing in this enum crosses the
/// module boundary from `read`/`write`/`clear`.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No persistent store exists in this environment
    #[error("Persistent storage unavailable in this environment")]
    StorageUnavailable,

    /// Write to the persistent store failed (quota, permissions, ...)
    #[error("Storage write failed: {0}")]
    StorageWriteFailure(String),

    /// Stored envelope failed to parse or carries the wrong schema version
    #[error("Corrupted state data: {0}")]
    CorruptedData(String),

    /// Stored state is older than the grace period
    #[error("Stored state is beyond the grace period")]
    StaleData,

    /// The external session check reported that no session exists
    #[error("Session definitively absent")]
    SessionMissing,

    /// Polling stopped after exhausting its retry budget
    #[error("Polling exhausted after {0} attempts")]
    MaxRetriesExceeded(u32),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(#[from] shared_state_storage::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true for the "session definitively absent" error class that
    /// makes the polling scheduler fail fast instead of waiting out its full
    /// retry budget.
    pub fn is_session_missing(&self) -> bool {
        matches!(self, SyncError::SessionMissing)
    }
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
