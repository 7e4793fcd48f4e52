//! `tessera new model|api|page|workflow <name>`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use tessera_renderer::context::DEFAULT_API_GROUP;
use tessera_renderer::{ApiScriptKind, ScaffoldKind, TemplateContext, TemplateEngine};
use tessera_sync::{scaffold, WriteOptions};

use super::{print_writes, project_context};

#[derive(Args, Debug, Clone, Copy)]
pub struct WriteFlags {
    /// Overwrite files that already exist.
    #[arg(long)]
    pub force: bool,

    /// Show what would be written without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl From<WriteFlags> for WriteOptions {
    fn from(flags: WriteFlags) -> Self {
        WriteOptions {
            force: flags.force,
            dry_run: flags.dry_run,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum NewCommand {
    /// Data model: meta/<Name>/<Name>.{define.json,columns.json,view.sql}.
    Model {
        name: String,
        #[command(flatten)]
        flags: WriteFlags,
    },

    /// API script: api/<group>/<name>.api.<ext>.
    Api {
        name: String,
        /// Script language: js, python or go.
        #[arg(long, short = 'k', default_value_t = ApiScriptKind::default())]
        kind: ApiScriptKind,
        #[arg(long, short = 'g', default_value = DEFAULT_API_GROUP)]
        group: String,
        #[command(flatten)]
        flags: WriteFlags,
    },

    /// Page: page/<name>/<name>.page.json.
    Page {
        name: String,
        #[command(flatten)]
        flags: WriteFlags,
    },

    /// Workflow: workflow/<name>/<name>.workflow.json.
    Workflow {
        name: String,
        #[command(flatten)]
        flags: WriteFlags,
    },
}

pub fn run(command: NewCommand) -> Result<()> {
    let app = project_context()?;
    let app_id = app.app_id().map(|id| id.0).unwrap_or_default();

    let (ctx, kind, flags) = match command {
        NewCommand::Model { name, flags } => {
            (TemplateContext::for_model(&name), ScaffoldKind::Model, flags)
        }
        NewCommand::Api {
            name,
            kind,
            group,
            flags,
        } => (
            TemplateContext::new(&name).with_group(group),
            ScaffoldKind::Api(kind),
            flags,
        ),
        NewCommand::Page { name, flags } => (TemplateContext::new(&name), ScaffoldKind::Page, flags),
        NewCommand::Workflow { name, flags } => {
            (TemplateContext::new(&name), ScaffoldKind::Workflow, flags)
        }
    };
    let ctx = ctx.with_app_id(app_id);

    let engine = TemplateEngine::for_project(&app.root).context("failed to load templates")?;
    let writes = scaffold(&app.root, &engine, &ctx, kind, flags.into())
        .with_context(|| format!("failed to scaffold {kind} '{}'", ctx.name))?;

    print_writes(&app.root, &writes, flags.dry_run);
    Ok(())
}
