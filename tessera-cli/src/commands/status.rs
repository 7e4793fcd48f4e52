//! `tessera status` and `tessera ping`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tessera_core::{Conflict, DiffResult};
use tessera_sync::{CancelToken, Remote, StatusReport};

use super::{
    offline_orchestrator, orchestrator, print_changes, print_conflicts, print_json,
    project_context, remote,
};

/// Arguments for `tessera status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only consult the side-file and the working tree.
    #[arg(long)]
    pub offline: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusJson<'a> {
    app_id: &'a str,
    local_version: &'a str,
    remote_version: Option<&'a str>,
    last_sync_at: Option<String>,
    ahead: usize,
    behind: Option<usize>,
    local_changes: &'a DiffResult,
    remote_changes: Option<&'a DiffResult>,
    conflicts: &'a [Conflict],
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "")]
    label: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let orch = if self.offline {
            offline_orchestrator(&ctx)?
        } else {
            orchestrator(&ctx)?
        };
        let report = orch.status(self.offline).context("status failed")?;
        let app_id = orch.context().app_id.0.clone();

        if self.json {
            return print_json(&StatusJson {
                app_id: &app_id,
                local_version: &report.local_version,
                remote_version: report.remote_version.as_deref(),
                last_sync_at: report.last_sync_at.map(|t| t.to_rfc3339()),
                ahead: report.ahead(),
                behind: report.remote_changes.as_ref().map(|_| report.behind()),
                local_changes: &report.local_changes,
                remote_changes: report.remote_changes.as_ref(),
                conflicts: &report.conflicts,
            });
        }

        print_table(&app_id, &report);
        Ok(())
    }
}

fn print_table(app_id: &str, report: &StatusReport) {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    let rows = vec![
        StatusRow {
            label: "app",
            value: app_id.to_string(),
        },
        StatusRow {
            label: "local version",
            value: or_dash(&report.local_version),
        },
        StatusRow {
            label: "remote version",
            value: report
                .remote_version
                .as_deref()
                .map_or_else(|| "(offline)".to_string(), or_dash),
        },
        StatusRow {
            label: "last sync",
            value: report
                .last_sync_at
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
        },
        StatusRow {
            label: "ahead",
            value: report.ahead().to_string(),
        },
        StatusRow {
            label: "behind",
            value: match report.remote_changes {
                Some(_) => report.behind().to_string(),
                None => "-".to_string(),
            },
        },
        StatusRow {
            label: "conflicts",
            value: report.conflicts.len().to_string(),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !report.local_changes.is_empty() {
        println!("{}", "Local changes:".bold());
        print_changes(&report.local_changes);
    }
    if let Some(remote) = report.remote_changes.as_ref().filter(|d| !d.is_empty()) {
        println!("{}", "Remote changes:".bold());
        print_changes(remote);
    }
    if !report.conflicts.is_empty() {
        println!("{}", "Conflicts:".red().bold());
        print_conflicts(&report.conflicts);
        println!("Run 'tessera resolve ours|theirs' to settle them.");
    } else if report.local_changes.is_empty() && report.behind() == 0 {
        println!("{} Up to date", "✓".green());
    }
}

/// Arguments for `tessera ping`.
#[derive(Args, Debug)]
pub struct PingArgs {}

impl PingArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let remote = remote(&ctx)?;
        remote
            .ping(&CancelToken::new())
            .with_context(|| format!("{} is not reachable", remote.base_url()))?;
        println!("✓ {} is reachable", remote.base_url());
        Ok(())
    }
}
