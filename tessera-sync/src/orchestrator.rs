//! Sync orchestrator: drives scan, compare, package, transmit, extract and
//! persist for every sync command.
//!
//! ## Push
//!
//! 1. Scan the tree.
//! 2. Compare with the side-file; stop early when nothing changed or on a
//!    dry run.
//! 3. Optionally ask the remote for conflicts (abort unless forced).
//! 4. Package added and modified files.
//! 5. Upload with a `YYYYMMDDhhmmss` version token.
//! 6. Record new hashes, the version and the timestamp in the side-file.
//!
//! The side-file is written only after the remote accepted the change set.
//!
//! ## Pull
//!
//! Resolve `latest` through the status endpoint, download, extract, then
//! replace the side-file's map with the archive's hashes. A failed download
//! writes nothing; a failed extraction leaves the entries already written.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use tessera_core::types::hash_map;
use tessera_core::{
    AppContext, AppId, ConfigError, Conflict, DiffResult, FileRecord, ProjectConfig,
    RepoUrl, Settings, SyncState,
};

use crate::cancel::CancelToken;
use crate::diff::{self, FileDiff, HashIndex};
use crate::error::{io_err, SyncError, SyncStep};
use crate::hasher;
use crate::package::{self, Package};
use crate::remote::{Remote, UploadFile, UploadRequest};
use crate::scanner::{ScanScope, Scanner};
use crate::state::StateStore;

/// Version name that resolves to the remote's current version.
pub const LATEST: &str = "latest";

// ---------------------------------------------------------------------------
// Context and options
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to know about the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub root: PathBuf,
    pub app_id: AppId,
    pub branch: String,
    pub author: String,
    pub scope: ScanScope,
}

impl SyncContext {
    pub fn new(root: impl Into<PathBuf>, app_id: impl Into<AppId>) -> Self {
        let defaults = Settings::default();
        Self {
            root: root.into(),
            app_id: app_id.into(),
            branch: defaults.sync.branch,
            author: defaults.sync.author,
            scope: ScanScope::Project,
        }
    }

    pub fn from_app(ctx: &AppContext) -> Result<Self, ConfigError> {
        Ok(Self {
            root: ctx.root.clone(),
            app_id: ctx.app_id()?,
            branch: ctx.settings.sync.branch.clone(),
            author: ctx.settings.sync.author.clone(),
            scope: ScanScope::Project,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub message: String,
    /// Push even when the remote reports conflicts.
    pub force: bool,
    /// Report what would be pushed without contacting the remote.
    pub dry_run: bool,
    /// Ask the remote for conflicts before uploading.
    pub check_conflicts: bool,
}

/// Where the orchestrator is (or stopped) in its current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Packaging,
    Comparing,
    Transmitting,
    Extracting,
    Persisting,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Packaging => "packaging",
            Phase::Comparing => "comparing",
            Phase::Transmitting => "transmitting",
            Phase::Extracting => "extracting",
            Phase::Persisting => "persisting",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Keep local content: force-push it.
    Ours,
    /// Take the remote copy of every conflicting path.
    Theirs,
    /// Report only.
    Manual,
}

impl std::str::FromStr for ResolveStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ours" | "local" => Ok(ResolveStrategy::Ours),
            "theirs" | "remote" => Ok(ResolveStrategy::Theirs),
            "manual" => Ok(ResolveStrategy::Manual),
            other => Err(format!("unknown strategy '{other}' (expected ours, theirs or manual)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub changes: DiffResult,
    /// Version recorded by the remote; `None` when nothing was uploaded.
    pub version: Option<String>,
    pub dry_run: bool,
}

impl PushReport {
    pub fn nothing_to_push(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub version: String,
    /// Extracted paths, sorted.
    pub files: Vec<String>,
    pub dirs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub local_version: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// `None` when the remote was not consulted.
    pub remote_version: Option<String>,
    pub local_changes: DiffResult,
    pub remote_changes: Option<DiffResult>,
    pub conflicts: Vec<Conflict>,
}

impl StatusReport {
    /// Local changes not yet pushed.
    pub fn ahead(&self) -> usize {
        self.local_changes.len()
    }

    /// Remote changes not yet pulled.
    pub fn behind(&self) -> usize {
        self.remote_changes.as_ref().map_or(0, DiffResult::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    pub strategy: ResolveStrategy,
    pub conflicts: Vec<Conflict>,
    /// Paths settled by this run.
    pub resolved: Vec<String>,
    /// Version pushed by `ours`.
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ctx: SyncContext,
    remote: Arc<dyn Remote>,
    store: StateStore,
    cancel: CancelToken,
    phase: Mutex<Phase>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ctx", &self.ctx)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(ctx: SyncContext, remote: Arc<dyn Remote>) -> Self {
        let store = StateStore::new(&ctx.root);
        Self {
            ctx,
            remote,
            store,
            cancel: CancelToken::new(),
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Share `token` with the caller so it can abort network calls.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Last phase entered.
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SyncState {
        self.store.load()
    }

    fn enter(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        tracing::debug!("phase -> {phase}");
    }

    /// Mark the operation failed and pass the error through.
    fn fail(&self, err: SyncError) -> SyncError {
        self.enter(Phase::Failed);
        tracing::warn!("sync failed: {err}");
        err
    }

    fn scan(&self) -> Result<Vec<FileRecord>, SyncError> {
        self.enter(Phase::Scanning);
        Scanner::new(&self.ctx.root)
            .scope(self.ctx.scope)
            .scan()
            .map_err(|e| self.fail(e))
    }

    fn remote_files(&self) -> Result<HashIndex, SyncError> {
        self.remote
            .fetch_file_list(&self.ctx.app_id, &self.cancel)
            .map(|files| hash_map(&files))
            .map_err(|e| self.fail(SyncError::remote(SyncStep::Comparing, e)))
    }

    fn persist(&self, state: &SyncState) -> Result<(), SyncError> {
        self.enter(Phase::Persisting);
        self.store.save(state).map_err(|e| self.fail(e))
    }

    /// `latest` (or empty) becomes the remote's current version.
    fn resolve_version(&self, version: &str) -> Result<String, SyncError> {
        let version = version.trim();
        if !version.is_empty() && version != LATEST {
            return Ok(version.to_string());
        }
        let status = self
            .remote
            .fetch_status(&self.ctx.app_id, &self.cancel)
            .map_err(|e| self.fail(SyncError::remote(SyncStep::Downloading, e)))?;
        if status.version.is_empty() {
            Ok(LATEST.to_string())
        } else {
            Ok(status.version)
        }
    }

    fn download(&self, version: &str) -> Result<Vec<u8>, SyncError> {
        self.enter(Phase::Transmitting);
        self.remote
            .download_package(&self.ctx.app_id, version, &self.cancel)
            .map_err(|e| self.fail(SyncError::remote(SyncStep::Downloading, e)))
    }

    // -----------------------------------------------------------------------
    // Read-only operations
    // -----------------------------------------------------------------------

    /// Local changes since the last sync.
    pub fn local_changes(&self) -> Result<DiffResult, SyncError> {
        let local = hash_map(&self.scan()?);
        self.enter(Phase::Comparing);
        let result = diff::diff_against_state(&local, &self.store.load());
        self.enter(Phase::Idle);
        Ok(result)
    }

    /// Local tree against the remote's file list.
    pub fn diff(&self) -> Result<DiffResult, SyncError> {
        let local = hash_map(&self.scan()?);
        self.enter(Phase::Comparing);
        let remote = self.remote_files()?;
        let result = diff::diff(&local, &remote);
        self.enter(Phase::Idle);
        Ok(result)
    }

    /// Version, ahead/behind counts and locally detected conflicts.
    ///
    /// With `offline`, only the side-file and the local tree are consulted.
    pub fn status(&self, offline: bool) -> Result<StatusReport, SyncError> {
        let state = self.store.load();
        let local = hash_map(&self.scan()?);
        self.enter(Phase::Comparing);
        let local_changes = diff::diff_against_state(&local, &state);

        let mut report = StatusReport {
            local_version: state.version.clone(),
            last_sync_at: state.last_sync_at,
            local_changes,
            ..StatusReport::default()
        };

        if !offline {
            let status = self
                .remote
                .fetch_status(&self.ctx.app_id, &self.cancel)
                .map_err(|e| self.fail(SyncError::remote(SyncStep::Comparing, e)))?;
            let remote = self.remote_files()?;
            let remote_changes = diff::diff_against_state(&remote, &state);
            report.conflicts =
                diff::detect_conflicts(&report.local_changes, &remote_changes, &local, &remote);
            report.remote_version = Some(status.version);
            report.remote_changes = Some(remote_changes);
        }

        self.enter(Phase::Idle);
        Ok(report)
    }

    /// Ask the remote which locally changed paths conflict.
    pub fn check_conflicts(&self) -> Result<Vec<Conflict>, SyncError> {
        let records = self.scan()?;
        let state = self.store.load();
        let conflicts = self.remote_conflicts(&records, &state)?;
        self.enter(Phase::Idle);
        Ok(conflicts)
    }

    fn remote_conflicts(
        &self,
        records: &[FileRecord],
        state: &SyncState,
    ) -> Result<Vec<Conflict>, SyncError> {
        self.enter(Phase::Comparing);
        let local = hash_map(records);
        let changed: BTreeSet<String> = diff::diff_against_state(&local, state)
            .paths()
            .map(str::to_string)
            .collect();
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<FileRecord> = records
            .iter()
            .filter(|r| changed.contains(&r.path))
            .cloned()
            .collect();

        let report = self
            .remote
            .check_conflicts(&self.ctx.app_id, &state.version, &candidates, &self.cancel)
            .map_err(|e| self.fail(SyncError::remote(SyncStep::Comparing, e)))?;

        // Keep only paths we changed whose content still differs.
        let conflicts = report
            .conflicts
            .into_iter()
            .filter(|c| changed.contains(&c.path))
            .map(|c| Conflict {
                local_hash: local.get(&c.path).cloned().unwrap_or_default(),
                ..c
            })
            .filter(|c| c.local_hash != c.remote_hash)
            .collect();
        Ok(conflicts)
    }

    /// Remote text content against local content for every modified path.
    pub fn diff_patches(&self, version: &str) -> Result<Vec<FileDiff>, SyncError> {
        let local = hash_map(&self.scan()?);
        let version = self.resolve_version(version)?;
        let archive = self.download(&version)?;

        self.enter(Phase::Comparing);
        let remote_files = package::read_archive(&archive).map_err(|e| self.fail(e))?;
        let remote: HashIndex = remote_files
            .iter()
            .map(|(path, content)| (path.clone(), hasher::hash_bytes(content)))
            .collect();

        let mut patches = Vec::new();
        for path in diff::diff(&local, &remote).modified {
            let src = self.ctx.root.join(&path);
            let local_bytes = std::fs::read(&src).map_err(|e| self.fail(io_err(src, e)))?;
            let (Ok(new), Some(Ok(old))) = (
                std::str::from_utf8(&local_bytes),
                remote_files.get(&path).map(|b| std::str::from_utf8(b)),
            ) else {
                tracing::debug!("skipping binary file {path}");
                continue;
            };
            patches.push(FileDiff {
                unified_diff: diff::unified_diff(&path, old, new),
                path,
            });
        }
        self.enter(Phase::Idle);
        Ok(patches)
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    pub fn push(&self, options: &PushOptions) -> Result<PushReport, SyncError> {
        let records = self.scan()?;
        let local = hash_map(&records);

        self.enter(Phase::Comparing);
        let mut state = self.store.load();
        let changes = diff::diff_against_state(&local, &state);
        let mut report = PushReport {
            changes,
            version: None,
            dry_run: options.dry_run,
        };

        if report.nothing_to_push() {
            tracing::info!("nothing to push");
            self.enter(Phase::Idle);
            return Ok(report);
        }
        if options.dry_run {
            tracing::info!("[dry-run] would push {} change(s)", report.changes.len());
            self.enter(Phase::Idle);
            return Ok(report);
        }

        if options.check_conflicts && !options.force {
            let conflicts = self.remote_conflicts(&records, &state)?;
            if !conflicts.is_empty() {
                return Err(self.fail(SyncError::Conflicts(conflicts)));
            }
        }

        self.enter(Phase::Packaging);
        let upload_paths: Vec<String> = report
            .changes
            .added
            .iter()
            .chain(report.changes.modified.iter())
            .cloned()
            .collect();
        let package = Package::build(&self.ctx.root, &upload_paths).map_err(|e| self.fail(e))?;
        let files: Vec<UploadFile> = package
            .entries()
            .map_err(|e| self.fail(e))?
            .into_iter()
            .map(|entry| UploadFile {
                hash: hasher::hash_bytes(&entry.content),
                path: entry.path,
                content: entry.content,
            })
            .collect();
        drop(package);

        self.enter(Phase::Transmitting);
        let request = UploadRequest {
            app_id: self.ctx.app_id.clone(),
            version: version_token(Utc::now()),
            branch: self.ctx.branch.clone(),
            message: options.message.clone(),
            author: self.ctx.author.clone(),
            files,
            deleted: report.changes.deleted.clone(),
        };
        let version = self
            .remote
            .upload_package(&request, &self.cancel)
            .map_err(|e| self.fail(SyncError::remote(SyncStep::Uploading, e)))?;

        for file in &request.files {
            state.files.insert(file.path.clone(), file.hash.clone());
        }
        for path in &request.deleted {
            state.files.remove(path);
        }
        state.version = version.clone();
        state.last_sync_at = Some(Utc::now());
        self.persist(&state)?;

        tracing::info!(
            "pushed {} file(s), {} deletion(s) as version {version}",
            request.files.len(),
            request.deleted.len()
        );
        report.version = Some(version);
        self.enter(Phase::Idle);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Pull / clone
    // -----------------------------------------------------------------------

    pub fn pull(&self, version: &str) -> Result<PullReport, SyncError> {
        let version = self.resolve_version(version)?;
        let archive = self.download(&version)?;

        self.enter(Phase::Extracting);
        let extracted = package::extract(&archive, &self.ctx.root).map_err(|e| self.fail(e))?;

        // Only paths a later scan can see; anything else would read as deleted.
        let scope = self.ctx.scope;
        let state = SyncState {
            version: version.clone(),
            last_sync_at: Some(Utc::now()),
            files: extracted
                .files
                .iter()
                .filter(|(path, _)| scope.tracks(path))
                .map(|(path, hash)| (path.clone(), hash.clone()))
                .collect(),
        };
        self.persist(&state)?;

        tracing::info!("pulled {} file(s) at version {version}", extracted.files.len());
        self.enter(Phase::Idle);
        Ok(PullReport {
            version,
            files: extracted.files.into_keys().collect(),
            dirs: extracted.dirs,
        })
    }

    /// Create `target`, write its `tessera.json` for `repo` and pull into it.
    ///
    /// If the pull fails, a directory created here is removed again and a
    /// directory that was already there is emptied.
    pub fn clone_repo(
        repo: &RepoUrl,
        target: &Path,
        settings: &Settings,
        remote: Arc<dyn Remote>,
        cancel: CancelToken,
    ) -> Result<(Self, PullReport), SyncError> {
        let existed = target.exists();
        if existed {
            let mut entries = std::fs::read_dir(target).map_err(|e| io_err(target, e))?;
            if entries.next().is_some() {
                return Err(SyncError::TargetNotEmpty(target.to_path_buf()));
            }
        }
        std::fs::create_dir_all(target).map_err(|e| io_err(target, e))?;

        let result: Result<(Self, PullReport), SyncError> = (|| {
            ProjectConfig::for_repo(repo).save(target)?;
            let ctx = SyncContext {
                root: target.to_path_buf(),
                app_id: AppId::from(repo.app_code.as_str()),
                branch: settings.sync.branch.clone(),
                author: settings.sync.author.clone(),
                scope: ScanScope::Project,
            };
            let orchestrator = Self::new(ctx, remote).with_cancel(cancel);
            let report = orchestrator.pull(LATEST)?;
            Ok((orchestrator, report))
        })();

        if result.is_err() {
            if existed {
                empty_dir(target);
            } else {
                let _ = std::fs::remove_dir_all(target);
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Conflict resolution
    // -----------------------------------------------------------------------

    /// Settle the conflicts reported by the remote with an explicit strategy.
    pub fn resolve(&self, strategy: ResolveStrategy, message: &str) -> Result<ResolveReport, SyncError> {
        let conflicts = self.check_conflicts()?;
        let mut report = ResolveReport {
            strategy,
            conflicts,
            resolved: Vec::new(),
            version: None,
        };
        if report.conflicts.is_empty() {
            return Ok(report);
        }

        match strategy {
            ResolveStrategy::Manual => {}
            ResolveStrategy::Ours => {
                let pushed = self.push(&PushOptions {
                    message: message.to_string(),
                    force: true,
                    dry_run: false,
                    check_conflicts: false,
                })?;
                report.version = pushed.version;
                report.resolved = report.conflicts.iter().map(|c| c.path.clone()).collect();
            }
            ResolveStrategy::Theirs => {
                report.resolved = self.take_theirs(&report.conflicts)?;
            }
        }
        Ok(report)
    }

    fn take_theirs(&self, conflicts: &[Conflict]) -> Result<Vec<String>, SyncError> {
        let wanted: BTreeSet<&str> = conflicts.iter().map(|c| c.path.as_str()).collect();
        let version = self.resolve_version(LATEST)?;
        let archive = self.download(&version)?;

        self.enter(Phase::Extracting);
        let extracted = package::extract_matching(&archive, &self.ctx.root, |p| wanted.contains(p))
            .map_err(|e| self.fail(e))?;

        let mut state = self.store.load();
        let mut resolved = Vec::new();
        for path in wanted {
            match extracted.files.get(path) {
                Some(_) if !self.ctx.scope.tracks(path) => {
                    state.files.remove(path);
                }
                Some(hash) => {
                    state.files.insert(path.to_string(), hash.clone());
                }
                None => {
                    // Deleted remotely: drop the local copy as well.
                    let local = self.ctx.root.join(path);
                    match std::fs::remove_file(&local) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(self.fail(io_err(local, e))),
                    }
                    state.files.remove(path);
                }
            }
            resolved.push(path.to_string());
        }
        self.persist(&state)?;
        self.enter(Phase::Idle);
        Ok(resolved)
    }
}

/// Best-effort removal of everything inside `dir`.
fn empty_dir(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let removed = if entry.file_type().is_ok_and(|t| t.is_dir()) {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(err) = removed {
            tracing::warn!("cannot clean up {}: {err}", path.display());
        }
    }
}

/// `YYYYMMDDhhmmss` in UTC.
pub fn version_token(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_token_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(version_token(ts), "20240309070501");
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("OURS".parse::<ResolveStrategy>().unwrap(), ResolveStrategy::Ours);
        assert_eq!("remote".parse::<ResolveStrategy>().unwrap(), ResolveStrategy::Theirs);
        assert!("merge".parse::<ResolveStrategy>().is_err());
    }

    #[test]
    fn status_counts() {
        let report = StatusReport {
            local_changes: DiffResult {
                added: vec!["a".into()],
                modified: vec!["b".into()],
                deleted: vec![],
            },
            remote_changes: Some(DiffResult {
                added: vec![],
                modified: vec![],
                deleted: vec!["c".into()],
            }),
            ..StatusReport::default()
        };
        assert_eq!(report.ahead(), 2);
        assert_eq!(report.behind(), 1);
        assert_eq!(StatusReport::default().behind(), 0);
    }
}
