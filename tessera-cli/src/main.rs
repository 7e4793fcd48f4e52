//! Tessera: low-code platform project sync CLI.
//!
//! # Usage
//!
//! ```text
//! tessera init [PATH] [--name <n>] [--repo <url>] [--force] [--dry-run]
//! tessera clone <url> [DIR]
//! tessera new model|api|page|workflow <name> [--kind js|python|go] [--group <g>]
//! tessera push [-m <message>] [--check] [--force] [--dry-run]
//! tessera pull [VERSION]
//! tessera diff [--local | --patch] [--json]
//! tessera status [--offline] [--json]
//! tessera check [--json]
//! tessera resolve ours|theirs|manual
//! tessera validate [--json]
//! tessera workflow list [--json]
//! tessera workflow validate [NAME]
//! tessera watch [--interval <secs>] [--forward] [--auto-push]
//! tessera config get|set|list
//! tessera ping
//! ```

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand,
    conflicts::{CheckArgs, ResolveArgs},
    diff::DiffArgs,
    init::{CloneArgs, InitArgs},
    new::NewCommand,
    status::{PingArgs, StatusArgs},
    sync::{PullArgs, PushArgs},
    validate::ValidateArgs,
    watch::WatchArgs,
    workflow::WorkflowCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    version,
    about = "Scaffold low-code applications and keep them in sync with the platform",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (overrides `logging.level`; `RUST_LOG` still wins).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new project skeleton.
    Init(InitArgs),

    /// Create a project from a repository URL and pull its latest version.
    Clone(CloneArgs),

    /// Scaffold a model, API script, page or workflow.
    New {
        #[command(subcommand)]
        command: NewCommand,
    },

    /// Upload local changes since the last sync.
    Push(PushArgs),

    /// Download a version and replace the local copy.
    Pull(PullArgs),

    /// Compare the working tree with the remote (or the last sync).
    Diff(DiffArgs),

    /// Show versions, pending changes and conflicts.
    Status(StatusArgs),

    /// Ask the remote which local changes conflict.
    Check(CheckArgs),

    /// Settle conflicts with an explicit strategy.
    Resolve(ResolveArgs),

    /// Check the project layout and every definition file.
    Validate(ValidateArgs),

    /// List or check workflow definitions.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Poll the project for changes until Ctrl-C.
    Watch(WatchArgs),

    /// Read or change user settings (~/.tessera/config.yaml).
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Check that the platform is reachable.
    Ping(PingArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Clone(args) => args.run(),
        Commands::New { command } => commands::new::run(command),
        Commands::Push(args) => args.run(),
        Commands::Pull(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Resolve(args) => args.run(),
        Commands::Validate(args) => args.run(),
        Commands::Workflow { command } => commands::workflow::run(command),
        Commands::Watch(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Ping(args) => args.run(),
    }
}
