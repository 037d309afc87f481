//! File system paths for the auth sync engine.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the user's home for runtime files.
const BASE_DIR_NAME: &str = ".easyroom";
/// Subdirectory holding the shared key/value state files.
const STATE_DIR_NAME: &str = "state";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.easyroom)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.easyroom`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.easyroom).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.easyroom/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the shared state directory (~/.easyroom/state).
    ///
    /// Every execution context must resolve the same directory here; it is
    /// the single namespace the sync engine converges through.
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join(STATE_DIR_NAME)
    }

    /// Ensure the base and state directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.state_dir())?;
        Ok(())
    }
}
