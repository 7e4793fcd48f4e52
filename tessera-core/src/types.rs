//! Domain types shared by the sync core, the watcher, and the CLI.
//!
//! Relative paths are always POSIX-style strings rooted at the project
//! directory; they double as keys in the sync side-file and on the wire.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Platform-side application identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(pub String);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AppId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Coarse classification of a project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Model,
    Api,
    Workflow,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    /// Classify a project-relative path.
    ///
    /// The top-level directory wins; files outside the known layout fall back
    /// to their extension.
    pub fn classify(path: &str) -> Category {
        match path.split('/').next().unwrap_or_default() {
            "meta" => return Category::Model,
            "api" => return Category::Api,
            "workflow" => return Category::Workflow,
            "page" => return Category::Other,
            _ => {}
        }
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Category::Model,
            "js" | "py" | "go" => Category::Api,
            "xml" | "bpmn" => Category::Workflow,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Model => write!(f, "model"),
            Category::Api => write!(f, "api"),
            Category::Workflow => write!(f, "workflow"),
            Category::Other => write!(f, "other"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scan / diff records
// ---------------------------------------------------------------------------

/// One file as seen by a single scan (local) or a remote file listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    #[serde(rename = "type", default)]
    pub category: Category,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        let path = path.into();
        let category = Category::classify(&path);
        Self {
            path,
            hash: hash.into(),
            category,
        }
    }
}

/// Path → hash view of a set of records.
pub fn hash_map(records: &[FileRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .map(|r| (r.path.clone(), r.hash.clone()))
        .collect()
}

/// Classification of paths between two file sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Every path mentioned, in added → modified → deleted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .map(String::as_str)
    }
}

/// Kind of a push-time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single local change relative to the last synced state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
    /// File content; `None` for deletions.
    pub content: Option<Vec<u8>>,
    /// Current local hash. For deletions this is the last synced hash.
    pub local_hash: String,
    /// Last synced hash, when the path was known at last sync.
    pub remote_hash: Option<String>,
}

/// A path changed independently on both sides since the last sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub path: String,
    pub local_hash: String,
    pub remote_hash: String,
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Last-synchronized bookkeeping persisted in the side-file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub version: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl SyncState {
    /// True when nothing has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.version.is_empty() && self.files.is_empty()
    }
}

/// Accepts RFC3339 strings, `null`, or an empty string (written by older
/// tooling to mean "never synced").
fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Watch events
// ---------------------------------------------------------------------------

/// Kind of change observed by the watcher between two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEventKind::Created => write!(f, "created"),
            WatchEventKind::Modified => write!(f, "modified"),
            WatchEventKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single watcher event for one project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventKind,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
