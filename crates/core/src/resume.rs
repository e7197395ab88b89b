//! Upload resume state
//!
//! When a backend keeps staged blocks across processes, the engine records
//! which blocks of an upload were staged so an interrupted upload can pick up
//! where it stopped instead of staging everything again.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Staged blocks of one in-progress upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadState {
    /// Target as `container/key`
    pub target: String,

    /// Chunk size the blocks were cut with
    pub chunk_size: usize,

    /// Block ids staged so far, in chunk order
    pub block_ids: Vec<String>,

    /// Timestamp of last update
    pub last_updated: jiff::Timestamp,
}

impl UploadState {
    pub fn new(target: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            target: target.into(),
            chunk_size,
            block_ids: Vec::new(),
            last_updated: jiff::Timestamp::now(),
        }
    }

    /// Whether chunk `index` was already staged with this id
    pub fn is_staged(&self, index: usize, block_id: &str) -> bool {
        self.block_ids.get(index).is_some_and(|id| id == block_id)
    }

    /// Record the id staged for chunk `index`
    pub fn record(&mut self, index: usize, block_id: &str) {
        self.block_ids.truncate(index);
        self.block_ids.push(block_id.to_string());
        self.last_updated = jiff::Timestamp::now();
    }

    /// State file path for a target
    pub fn state_file_path(state_dir: &Path, target: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(target.as_bytes()));
        state_dir.join(format!("upload_{digest}.json"))
    }

    /// Save state to file
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = Self::state_file_path(state_dir, &self.target);
        std::fs::create_dir_all(state_dir).map_err(|e| Error::cache_io(state_dir.display(), e))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::General(format!("serializing upload state: {e}")))?;
        std::fs::write(&path, json).map_err(|e| Error::cache_io(path.display(), e))
    }

    /// Load the state of a target, if a usable one exists
    ///
    /// A state recorded with a different chunk size describes different
    /// blocks and is ignored. Unreadable state files are ignored as well.
    pub fn load(state_dir: &Path, target: &str, chunk_size: usize) -> Option<Self> {
        let path = Self::state_file_path(state_dir, target);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Self>(&content) {
            Ok(state) if state.target == target && state.chunk_size == chunk_size => Some(state),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt upload state");
                None
            }
        }
    }

    /// Delete the state file of a target
    pub fn delete(state_dir: &Path, target: &str) -> Result<()> {
        let path = Self::state_file_path(state_dir, target);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| Error::cache_io(path.display(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_is_staged() {
        let mut state = UploadState::new("c/k", 100);
        assert!(!state.is_staged(0, "a"));

        state.record(0, "a");
        state.record(1, "b");
        assert!(state.is_staged(0, "a"));
        assert!(state.is_staged(1, "b"));
        assert!(!state.is_staged(1, "a"));

        // Re-recording an earlier index drops everything after it
        state.record(0, "z");
        assert_eq!(state.block_ids, vec!["z"]);
    }

    #[test]
    fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let mut state = UploadState::new("c/dir/k", 100);
        state.record(0, "a");
        state.save(dir.path()).unwrap();

        let loaded = UploadState::load(dir.path(), "c/dir/k", 100).unwrap();
        assert_eq!(loaded.block_ids, vec!["a"]);

        assert!(UploadState::load(dir.path(), "c/dir/k", 200).is_none());
        assert!(UploadState::load(dir.path(), "c/other", 100).is_none());

        UploadState::delete(dir.path(), "c/dir/k").unwrap();
        assert!(UploadState::load(dir.path(), "c/dir/k", 100).is_none());
    }

    #[test]
    fn test_state_paths_differ_per_target() {
        let dir = Path::new("/state");
        assert_ne!(
            UploadState::state_file_path(dir, "c/a_b"),
            UploadState::state_file_path(dir, "c/a/b")
        );
    }

    #[test]
    fn test_corrupt_state_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = UploadState::state_file_path(dir.path(), "c/k");
        std::fs::write(&path, "not json").unwrap();
        assert!(UploadState::load(dir.path(), "c/k", 100).is_none());
    }
}
