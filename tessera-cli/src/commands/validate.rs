//! `tessera validate`

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use tessera_sync::validate_project;

use super::{print_json, project_context};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let report = validate_project(&ctx.root).context("validation failed")?;

        if self.json {
            print_json(&report)?;
        } else {
            println!("  models     {}", report.models);
            println!("  apis       {}", report.apis);
            println!("  pages      {}", report.pages);
            println!("  workflows  {}", report.workflows);
            for problem in &report.problems {
                println!("  {} {}: {}", "✗".red(), problem.path, problem.message);
            }
        }

        if !report.is_valid() {
            bail!("validation found {} problem(s)", report.problems.len());
        }
        if !self.json {
            println!("{} Project is valid", "✓".green());
        }
        Ok(())
    }
}
