//! Storage trait definitions.

use crate::StorageResult;

/// Trait for shared key/value storage backends.
///
/// Values are opaque strings; serialization is the caller's concern. A `set`
/// must fully replace any previous value for the key so that concurrent
/// writers produce last-writer-wins semantics, never a merged record.
pub trait SharedStateStore: Send + Sync {
    /// Store a value, replacing any existing value for the key.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns true if the key existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
