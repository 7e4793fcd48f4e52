pub mod config;
pub mod conflicts;
pub mod diff;
pub mod init;
pub mod new;
pub mod status;
pub mod sync;
pub mod validate;
pub mod watch;
pub mod workflow;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use tessera_core::{AppContext, Conflict, DiffResult};
use tessera_sync::{HttpRemote, Orchestrator, ScanScope, SyncContext, WriteResult};

/// Project context for the current directory.
pub fn project_context() -> Result<AppContext> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    AppContext::discover(&cwd)
        .context("not inside a tessera project; run `tessera init` or `tessera clone` first")
}

pub fn remote(ctx: &AppContext) -> Result<HttpRemote> {
    HttpRemote::from_context(ctx).context("cannot determine the platform API URL")
}

pub fn orchestrator(ctx: &AppContext) -> Result<Orchestrator> {
    scoped_orchestrator(ctx, ScanScope::Project)
}

/// Orchestrator whose scans cover `scope`.
pub fn scoped_orchestrator(ctx: &AppContext, scope: ScanScope) -> Result<Orchestrator> {
    let mut sync_ctx = SyncContext::from_app(ctx).context("cannot determine the application id")?;
    sync_ctx.scope = scope;
    Ok(Orchestrator::new(sync_ctx, Arc::new(remote(ctx)?)))
}

/// Orchestrator for commands that never reach the network.
pub fn offline_orchestrator(ctx: &AppContext) -> Result<Orchestrator> {
    let sync_ctx = SyncContext::from_app(ctx).context("cannot determine the application id")?;
    let remote = HttpRemote::from_context(ctx).unwrap_or_else(|_| HttpRemote::new(""));
    Ok(Orchestrator::new(sync_ctx, Arc::new(remote)))
}

// ---------------------------------------------------------------------------
// Shared output
// ---------------------------------------------------------------------------

pub fn print_changes(changes: &DiffResult) {
    for path in &changes.added {
        println!("  {} {path}", "+".green().bold());
    }
    for path in &changes.modified {
        println!("  {} {path}", "~".yellow().bold());
    }
    for path in &changes.deleted {
        println!("  {} {path}", "-".red().bold());
    }
}

pub fn print_conflicts(conflicts: &[Conflict]) {
    for conflict in conflicts {
        println!(
            "  {} {}  (local {}, remote {})",
            "!".red().bold(),
            conflict.path,
            short_hash(&conflict.local_hash),
            short_hash(&conflict.remote_hash),
        );
    }
}

pub fn print_writes(root: &Path, writes: &[WriteResult], dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let written = writes
        .iter()
        .filter(|w| !matches!(w, WriteResult::Skipped { .. }))
        .count();
    let skipped = writes.len() - written;
    println!("{prefix}✓ {written} file(s) written, {skipped} skipped");

    for w in writes {
        let shown = w.path().strip_prefix(root).unwrap_or(w.path());
        match w {
            WriteResult::Written { .. } => println!("  ✎  {}", shown.display()),
            WriteResult::WouldWrite { .. } => println!("  ~  {}", shown.display()),
            WriteResult::Skipped { .. } => {
                println!("  ·  {} (exists; use --force)", shown.display())
            }
        }
    }
}

pub fn short_hash(hash: &str) -> &str {
    if hash.is_empty() {
        "deleted"
    } else {
        hash.get(..8).unwrap_or(hash)
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
