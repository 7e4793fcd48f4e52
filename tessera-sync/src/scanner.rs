//! Tree scanner: walks a project and hashes every tracked file.
//!
//! Two scopes are supported:
//!
//! | Scope        | Included files                                         |
//! |--------------|--------------------------------------------------------|
//! | `Project`    | everything under `meta/`, `api/`, `page/`, `workflow/` |
//! | `Extensions` | any file ending in `.json .js .py .go .xml .bpmn`      |
//!
//! Directories in [`IGNORED_DIRS`] are pruned at any depth.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use tessera_core::project::STATE_DIR;
use tessera_core::FileRecord;

use crate::error::SyncError;
use crate::hasher;

/// Top-level directories making up a project tree.
pub const PROJECT_DIRS: &[&str] = &["meta", "api", "page", "workflow"];

/// Extensions tracked by [`ScanScope::Extensions`].
pub const TRACKED_EXTENSIONS: &[&str] = &["json", "js", "py", "go", "xml", "bpmn"];

/// Directory names never descended into.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "__pycache__",
    ".idea",
    ".vscode",
    STATE_DIR,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanScope {
    #[default]
    Project,
    Extensions,
}

impl ScanScope {
    /// Whether a root-relative POSIX path belongs to this scope.
    pub fn includes(&self, rel: &str) -> bool {
        match self {
            ScanScope::Project => rel
                .split_once('/')
                .is_some_and(|(top, _)| PROJECT_DIRS.contains(&top)),
            ScanScope::Extensions => rel
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .is_some_and(|ext| TRACKED_EXTENSIONS.contains(&ext.as_str())),
        }
    }

    /// Whether a scan in this scope can report `rel`: included, and not below
    /// an ignored directory.
    pub fn tracks(&self, rel: &str) -> bool {
        let dirs = rel.rsplit_once('/').map_or("", |(dirs, _)| dirs);
        self.includes(rel) && !dirs.split('/').any(|d| IGNORED_DIRS.contains(&d))
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    scope: ScanScope,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scope: ScanScope::default(),
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: ScanScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree, returning records sorted by path.
    ///
    /// An unreadable root is an error. Individual entries that cannot be
    /// read or hashed are logged and skipped.
    pub fn scan(&self) -> Result<Vec<FileRecord>, SyncError> {
        std::fs::read_dir(&self.root).map_err(|source| SyncError::Scan {
            path: self.root.clone(),
            source,
        })?;

        let mut records = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_posix(&self.root, entry.path()) else {
                continue;
            };
            if !self.scope.includes(&rel) {
                continue;
            }
            match hasher::hash_file(entry.path()) {
                Ok(hash) => records.push(FileRecord::new(rel, hash)),
                Err(err) => tracing::warn!("skipping {}: {err}", entry.path().display()),
            }
        }

        records.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("scanned {} file(s) under {}", records.len(), self.root.display());
        Ok(records)
    }

    /// [`Scanner::scan`] as an ordered `path -> hash` map.
    pub fn scan_map(&self) -> Result<BTreeMap<String, String>, SyncError> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|r| (r.path, r.hash))
            .collect())
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// `path` relative to `root` with `/` separators.
pub fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
