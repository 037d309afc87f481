//! In-memory storage backend.

use crate::{SharedStateStore, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store backed by a `Mutex<HashMap>`.
///
/// Used by tests and by callers that want a per-process store without a
/// shared directory. Sharing one instance behind an `Arc` gives several
/// managers the same "tab-shared" view the file backend provides on disk.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStateStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self
            .data
            .lock()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?;
        Ok(data.remove(key).is_some())
    }
}
