//! File-backed storage: one file per key under a shared directory.

use crate::{SharedStateStore, StorageError, StorageResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed store.
///
/// Each key maps to `<dir>/<key>.kv`. Writes go to a temp file first and are
/// renamed into place, so a reader in another process either sees the old
/// value or the new one, never a partial write.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn entry_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.kv")))
    }
}

/// Keys become file names, so restrict them to a safe character set.
fn validate_key(key: &str) -> StorageResult<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

impl SharedStateStore for FileStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        let tmp = self
            .dir
            .join(format!(".{key}.{}.tmp", std::process::id()));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        debug!(key = %key, "Stored value");
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert_eq!(store.get("easyroom_auth_state").unwrap(), None);

        store.set("easyroom_auth_state", r#"{"version":"2.0"}"#).unwrap();
        assert_eq!(
            store.get("easyroom_auth_state").unwrap(),
            Some(r#"{"version":"2.0"}"#.to_string())
        );

        assert!(store.delete("easyroom_auth_state").unwrap());
        assert!(!store.delete("easyroom_auth_state").unwrap());
        assert_eq!(store.get("easyroom_auth_state").unwrap(), None);
    }

    #[test]
    fn test_set_replaces_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("auth_state", "first value, quite long").unwrap();
        store.set("auth_state", "second").unwrap();
        assert_eq!(store.get("auth_state").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_two_stores_share_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileStore::new(dir.path()).unwrap();
        let reader = FileStore::new(dir.path()).unwrap();

        writer.set("easyroom_token", "abc123").unwrap();
        assert_eq!(reader.get("easyroom_token").unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set("user_session", "v").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
