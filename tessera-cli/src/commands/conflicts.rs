//! `tessera check` and `tessera resolve`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tessera_sync::ResolveStrategy;

use super::{orchestrator, print_conflicts, print_json, project_context};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let conflicts = orchestrator(&ctx)?
            .check_conflicts()
            .context("conflict check failed")?;

        if self.json {
            return print_json(&conflicts);
        }
        if conflicts.is_empty() {
            println!("{} No conflicts", "✓".green());
        } else {
            println!("{} {} conflicting path(s):", "✗".red(), conflicts.len());
            print_conflicts(&conflicts);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// ours (force-push local), theirs (take remote copies) or manual (report).
    pub strategy: ResolveStrategy,

    /// Message for the version pushed by `ours`.
    #[arg(long, short = 'm', default_value = "resolve conflicts")]
    pub message: String,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let report = orchestrator(&ctx)?
            .resolve(self.strategy, &self.message)
            .context("resolve failed")?;

        if report.conflicts.is_empty() {
            println!("{} No conflicts to resolve", "✓".green());
            return Ok(());
        }
        if report.resolved.is_empty() {
            println!("{} conflicting path(s) left for manual resolution:", report.conflicts.len());
            print_conflicts(&report.conflicts);
            return Ok(());
        }
        match &report.version {
            Some(version) => println!(
                "✓ Kept local copies of {} path(s); pushed version {version}",
                report.resolved.len()
            ),
            None => println!("✓ Took remote copies of {} path(s)", report.resolved.len()),
        }
        for path in &report.resolved {
            println!("  ✎  {path}");
        }
        Ok(())
    }
}
