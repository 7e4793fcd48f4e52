//! `tessera diff`: hash-level or unified diff against the platform.

use anyhow::{Context, Result};
use clap::Args;

use super::{offline_orchestrator, orchestrator, print_changes, print_json, project_context};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Compare with the last sync instead of the remote (no network).
    #[arg(long, conflicts_with = "patch")]
    pub local: bool,

    /// Download the remote archive and print unified diffs for modified files.
    #[arg(long)]
    pub patch: bool,

    /// Remote version used by --patch.
    #[arg(long, default_value = "latest", requires = "patch")]
    pub version: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;

        if self.patch {
            let patches = orchestrator(&ctx)?
                .diff_patches(&self.version)
                .context("failed to build patches")?;
            if self.json {
                let payload: Vec<_> = patches
                    .iter()
                    .map(|p| serde_json::json!({ "path": p.path, "diff": p.unified_diff }))
                    .collect();
                return print_json(&payload);
            }
            if patches.is_empty() {
                println!("No text differences.");
            }
            for patch in patches {
                print!("{}", patch.unified_diff);
            }
            return Ok(());
        }

        let changes = if self.local {
            offline_orchestrator(&ctx)?
                .local_changes()
                .context("failed to compare with last sync")?
        } else {
            orchestrator(&ctx)?
                .diff()
                .context("failed to compare with remote")?
        };

        if self.json {
            return print_json(&changes);
        }
        if changes.is_empty() {
            println!("✓ No differences");
            return Ok(());
        }
        println!(
            "{} added, {} modified, {} deleted",
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len()
        );
        print_changes(&changes);
        Ok(())
    }
}
