//! `tessera push` and `tessera pull`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tessera_sync::{PushOptions, SyncError};

use super::{orchestrator, print_changes, print_conflicts, project_context};

const DEFAULT_MESSAGE: &str = "update from tessera";

/// Upload local changes since the last sync.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Commit message recorded with the new version.
    #[arg(long, short = 'm', default_value = DEFAULT_MESSAGE)]
    pub message: String,

    /// Ask the platform for conflicts first and stop if there are any.
    #[arg(long)]
    pub check: bool,

    /// Push even when the platform reports conflicts.
    #[arg(long)]
    pub force: bool,

    /// Show what would be pushed without contacting the platform.
    #[arg(long)]
    pub dry_run: bool,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let orch = orchestrator(&ctx)?;

        let options = PushOptions {
            message: self.message,
            force: self.force,
            dry_run: self.dry_run,
            check_conflicts: self.check,
        };
        let report = match orch.push(&options) {
            Ok(report) => report,
            Err(SyncError::Conflicts(conflicts)) => {
                println!("{} {} conflicting path(s):", "✗".red(), conflicts.len());
                print_conflicts(&conflicts);
                anyhow::bail!(
                    "push aborted; run `tessera resolve ours|theirs` or push with --force"
                );
            }
            Err(err) => return Err(err).context("push failed"),
        };

        if report.nothing_to_push() {
            println!("✓ Nothing to push");
            return Ok(());
        }
        if report.dry_run {
            println!("[dry-run] would push {} change(s):", report.changes.len());
            print_changes(&report.changes);
            return Ok(());
        }

        println!(
            "✓ Pushed {} change(s) as version {}",
            report.changes.len(),
            report.version.as_deref().unwrap_or("?")
        );
        print_changes(&report.changes);
        Ok(())
    }
}

/// Download a version and replace the local copy.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Version to pull.
    #[arg(default_value = "latest")]
    pub version: String,
}

impl PullArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let orch = orchestrator(&ctx)?;
        let report = orch
            .pull(&self.version)
            .with_context(|| format!("pull of version '{}' failed", self.version))?;
        println!(
            "✓ Pulled version {} ({} file(s))",
            report.version,
            report.files.len()
        );
        Ok(())
    }
}
