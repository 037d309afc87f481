//! Shared persistent key/value store for the EasyRoom auth sync engine.
//!
//! Multiple execution contexts (browser tabs, the external auth window, a
//! reloading page) converge on one auth state through this store. There is no
//! live channel between contexts: whatever is written here is the only thing
//! another context can observe, so writes are always full replacements and
//! reads re-validate rather than trust cached values.
//!
//! Backends:
//! - **[`FileStore`]**: one file per key under a shared directory, written
//!   atomically (temp file + rename) so concurrent writers never produce a
//!   torn record.
//! - **[`MemoryStore`]**: `Mutex<HashMap>` backend for tests and in-process
//!   fallback.

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::SharedStateStore;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No persistent store is available in this environment.
    #[error("Persistent storage unavailable")]
    Unavailable,

    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Key contains characters the backend cannot represent
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed store rooted at the given directory.
///
/// Returns an error when the directory cannot be created, which callers treat
/// as "no persistent store in this environment" and degrade to no-ops.
pub fn create_store(dir: &Path) -> StorageResult<Box<dyn SharedStateStore>> {
    let store = FileStore::new(dir)?;
    Ok(Box::new(store))
}
