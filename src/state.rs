//! Ingest ledger: which files were processed, with what content.
//!
//! The ledger maps absolute source paths to the content hash and mtime
//! observed at the last successful ingest. A file is skipped only when
//! both still match. The ledger is written once at the end of a run;
//! forced runs neither consult nor update it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileState {
    pub content_hash: String,
    pub mtime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestState {
    pub files: BTreeMap<String, FileState>,
}

impl IngestState {
    /// Read the ledger, starting fresh when the file is missing. An
    /// unreadable or corrupt ledger is logged and treated as empty so a
    /// run can rebuild it.
    pub fn load(path: &Path) -> IngestState {
        match Self::try_load(path) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "State file unreadable, starting fresh");
                IngestState::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<IngestState, IngestError> {
        if !path.exists() {
            return Ok(IngestState::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|err| IngestError::StateCorruption {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|err| IngestError::StateCorruption {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| IngestError::io(parent, err))?;
            }
        }
        let raw = serde_json::to_string_pretty(self).map_err(|err| IngestError::StateCorruption {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|err| IngestError::io(path, err))
    }

    /// True when the recorded hash and mtime both match.
    pub fn is_unchanged(&self, key: &str, content_hash: &str, mtime: &str) -> bool {
        self.files
            .get(key)
            .map(|entry| entry.content_hash == content_hash && entry.mtime == mtime)
            .unwrap_or(false)
    }

    pub fn update(&mut self, key: String, content_hash: String, mtime: String) {
        self.files.insert(
            key,
            FileState {
                content_hash,
                mtime,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = IngestState::load(&dir.path().join("nope.json"));
        assert!(state.files.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").expect("write");
        let state = IngestState::load(&path);
        assert!(state.files.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let mut state = IngestState::default();
        state.update(
            "/data/a.md".to_string(),
            "abc123".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );
        state.save(&path).expect("save");

        let loaded = IngestState::load(&path);
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(
            loaded.files["/data/a.md"],
            FileState {
                content_hash: "abc123".to_string(),
                mtime: "2024-01-01T00:00:00Z".to_string(),
            }
        );
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/deep/state.json");
        IngestState::default().save(&path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn test_is_unchanged_requires_both_fields() {
        let mut state = IngestState::default();
        state.update(
            "k".to_string(),
            "h1".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );

        assert!(state.is_unchanged("k", "h1", "2024-01-01T00:00:00Z"));
        assert!(!state.is_unchanged("k", "h2", "2024-01-01T00:00:00Z"));
        assert!(!state.is_unchanged("k", "h1", "2024-01-02T00:00:00Z"));
        assert!(!state.is_unchanged("other", "h1", "2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_state_serializes_as_plain_map() {
        let mut state = IngestState::default();
        state.update(
            "a".to_string(),
            "h".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );
        let json = serde_json::to_value(&state).expect("to_value");
        assert!(json.get("a").is_some());
        assert_eq!(json["a"]["content_hash"], "h");
    }
}
