//! Sync side-file: last-synchronized hashes at
//! `<root>/.tessera/sync-state.json`.
//!
//! Reads degrade to an empty [`SyncState`]; writes use the same atomic
//! `.tmp` + rename pattern as the project config.

use std::path::{Path, PathBuf};

use tessera_core::project::STATE_DIR;
use tessera_core::SyncState;

use crate::error::SyncError;

pub const STATE_FILE: &str = "sync-state.json";

/// Handle on one project's side-file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: Self::path_in(root),
        }
    }

    /// `<root>/.tessera/sync-state.json`: pure, no I/O.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(STATE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the side-file. Never fails: a missing or unreadable file yields
    /// an empty state.
    pub fn load(&self) -> SyncState {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return SyncState::default();
            }
            Err(err) => {
                tracing::warn!("cannot read {}: {err}; starting from empty state", self.path.display());
                return SyncState::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!("ignoring corrupt {}: {err}", self.path.display());
                SyncState::default()
            }
        }
    }

    /// Overwrite the side-file with `state`.
    pub fn save(&self, state: &SyncState) -> Result<(), SyncError> {
        let state_err = |path: &Path, source| SyncError::State {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| state_err(dir, e))?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| state_err(&self.path, std::io::Error::other(e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, format!("{json}\n")).map_err(|e| state_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(state_err(&self.path, e));
        }
        tracing::debug!("saved sync state ({} file(s)) to {}", state.files.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample() -> SyncState {
        SyncState {
            version: "20240101120000".to_string(),
            last_sync_at: Some(Utc::now()),
            files: BTreeMap::from([
                ("meta/User/User.columns.json".to_string(), "aa".to_string()),
                ("api/user/get.api.js".to_string(), "bb".to_string()),
            ]),
        }
    }

    #[test]
    fn empty_state_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(StateStore::new(tmp.path()).load().is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ truncated").unwrap();
        assert_eq!(store.load(), SyncState::default());
    }

    #[test]
    fn save_then_load_matches() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        let state = sample();
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn resaving_loaded_state_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        store.save(&sample()).unwrap();
        let before = std::fs::read(store.path()).unwrap();
        store.save(&store.load()).unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn files_are_written_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        store.save(&sample()).unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        let api = text.find("api/user").unwrap();
        let meta = text.find("meta/User").unwrap();
        assert!(api < meta);
        assert!(text.contains("\"lastSyncAt\""));
    }

    #[test]
    #[cfg(unix)]
    fn unwritable_dir_is_state_error() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o500)).unwrap();

        let result = StateStore::new(tmp.path()).save(&sample());
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).unwrap();
        // root ignores directory permissions
        if let Err(err) = result {
            assert!(matches!(err, SyncError::State { .. }));
        }
    }
}
