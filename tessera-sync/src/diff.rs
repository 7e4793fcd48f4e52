//! Diff engine: hash-level comparison of two file sets, push-time change
//! collection, conflict detection and unified text diffs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use similar::TextDiff;

use tessera_core::{Change, ChangeKind, Conflict, DiffResult, SyncState};

use crate::error::{io_err, SyncError};

/// Path -> hash view of one side.
pub type HashIndex = BTreeMap<String, String>;

/// Classify every path whose presence or hash differs between the sides.
///
/// Local-only paths are added, remote-only paths are deleted, and paths on
/// both sides with different hashes are modified. Each list is sorted.
pub fn diff(local: &HashIndex, remote: &HashIndex) -> DiffResult {
    let mut result = DiffResult::default();
    for (path, hash) in local {
        match remote.get(path) {
            None => result.added.push(path.clone()),
            Some(other) if other != hash => result.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    result.deleted = remote
        .keys()
        .filter(|path| !local.contains_key(*path))
        .cloned()
        .collect();
    result
}

/// [`diff`] with the last synced state as the remote side.
pub fn diff_against_state(local: &HashIndex, state: &SyncState) -> DiffResult {
    diff(local, &state.files)
}

/// Local changes since the last sync, with content read for added and
/// modified paths.
pub fn collect_changes(
    root: &Path,
    local: &HashIndex,
    state: &SyncState,
) -> Result<Vec<Change>, SyncError> {
    let delta = diff_against_state(local, state);
    let mut changes = Vec::with_capacity(delta.len());

    let read = |rel: &str| {
        let path = root.join(rel);
        std::fs::read(&path).map_err(|e| io_err(path, e))
    };

    for path in &delta.added {
        changes.push(Change {
            kind: ChangeKind::Added,
            path: path.clone(),
            content: Some(read(path.as_str())?),
            local_hash: local[path].clone(),
            remote_hash: None,
        });
    }
    for path in &delta.modified {
        changes.push(Change {
            kind: ChangeKind::Modified,
            path: path.clone(),
            content: Some(read(path.as_str())?),
            local_hash: local[path].clone(),
            remote_hash: state.files.get(path).cloned(),
        });
    }
    for path in &delta.deleted {
        let synced = state.files.get(path).cloned().unwrap_or_default();
        changes.push(Change {
            kind: ChangeKind::Deleted,
            path: path.clone(),
            content: None,
            local_hash: synced.clone(),
            remote_hash: Some(synced),
        });
    }
    Ok(changes)
}

/// Paths changed on both sides since the last sync that did not converge on
/// the same content.
///
/// A side that deleted the path contributes an empty hash.
pub fn detect_conflicts(
    local_changes: &DiffResult,
    remote_changes: &DiffResult,
    local: &HashIndex,
    remote: &HashIndex,
) -> Vec<Conflict> {
    let ours: BTreeSet<&str> = local_changes.paths().collect();
    let theirs: BTreeSet<&str> = remote_changes.paths().collect();

    ours.intersection(&theirs)
        .filter_map(|path| {
            let local_hash = local.get(*path).cloned().unwrap_or_default();
            let remote_hash = remote.get(*path).cloned().unwrap_or_default();
            (local_hash != remote_hash).then(|| Conflict {
                path: (*path).to_string(),
                local_hash,
                remote_hash,
            })
        })
        .collect()
}

/// Unified diff of `old` (remote) against `new` (local) for one path.
///
/// Returns an empty string when the texts are equal.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    let old = old.replace("\r\n", "\n");
    let new = new.replace("\r\n", "\n");
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .context_radius(3)
        .to_string()
}

/// A rendered text diff for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
}
