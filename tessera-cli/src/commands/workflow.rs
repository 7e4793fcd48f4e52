//! `tessera workflow list|validate`

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tessera_sync::{list_workflows, WorkflowSummary};

use super::{print_json, project_context};

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// List workflow definitions under workflow/.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check workflow graphs: a name, one start node, an end node, and
    /// edges between known nodes.
    Validate {
        /// Only this workflow (name or file stem).
        name: Option<String>,
    },
}

#[derive(Tabled)]
struct WorkflowRow {
    name: String,
    path: String,
    nodes: usize,
    edges: usize,
    status: String,
}

pub fn run(command: WorkflowCommand) -> Result<()> {
    let ctx = project_context()?;
    let workflows = list_workflows(&ctx.root).context("cannot list workflows")?;

    match command {
        WorkflowCommand::List { json } => {
            if json {
                return print_json(&workflows);
            }
            if workflows.is_empty() {
                println!("No workflows; create one with 'tessera new workflow <name>'");
                return Ok(());
            }
            let rows: Vec<WorkflowRow> = workflows.iter().map(row).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            Ok(())
        }
        WorkflowCommand::Validate { name } => {
            let selected: Vec<&WorkflowSummary> = match &name {
                Some(name) => workflows.iter().filter(|w| matches(w, name)).collect(),
                None => workflows.iter().collect(),
            };
            if let (Some(name), true) = (&name, selected.is_empty()) {
                bail!("no workflow named '{name}'");
            }

            let mut problems = 0;
            for workflow in &selected {
                if workflow.problems.is_empty() {
                    println!("  {} {}", "✓".green(), workflow.path);
                    continue;
                }
                println!("  {} {}", "✗".red(), workflow.path);
                for problem in &workflow.problems {
                    println!("      {problem}");
                }
                problems += workflow.problems.len();
            }
            if problems > 0 {
                bail!("workflow validation found {problems} problem(s)");
            }
            println!("{} {} workflow(s) valid", "✓".green(), selected.len());
            Ok(())
        }
    }
}

fn row(w: &WorkflowSummary) -> WorkflowRow {
    WorkflowRow {
        name: w.name.clone(),
        path: w.path.clone(),
        nodes: w.nodes,
        edges: w.edges,
        status: if w.problems.is_empty() {
            "ok".to_string()
        } else {
            format!("{} problem(s)", w.problems.len())
        },
    }
}

fn matches(workflow: &WorkflowSummary, name: &str) -> bool {
    let stem = workflow
        .path
        .rsplit('/')
        .next()
        .and_then(|f| f.strip_suffix(tessera_sync::validate::WORKFLOW_SUFFIX));
    workflow.name == name || stem == Some(name)
}
