//! `tessera init [PATH]` and `tessera clone <url> [DIR]`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use tessera_core::{settings, RepoUrl};
use tessera_renderer::{ScaffoldKind, TemplateContext, TemplateEngine};
use tessera_sync::{scaffold, CancelToken, HttpRemote, Orchestrator, WriteOptions};

use super::print_writes;

/// Create a project skeleton: `tessera.json`, README, `.gitignore` and the
/// `meta/ api/ page/ workflow/` directories.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project directory (created if missing).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Application name (defaults to the directory name).
    #[arg(long)]
    pub name: Option<String>,

    /// Application id (defaults to the repository's app code, then the name).
    #[arg(long)]
    pub app_id: Option<String>,

    /// Repository URL: scheme://host[:port]/tenant/app-code.
    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Overwrite files that already exist.
    #[arg(long)]
    pub force: bool,

    /// Show what would be written without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        if !self.dry_run {
            std::fs::create_dir_all(&self.path)
                .with_context(|| format!("cannot create '{}'", self.path.display()))?;
        }
        let root = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());

        let name = match self.name {
            Some(name) => name,
            None => dir_name(&root).context("cannot derive a name; pass --name")?,
        };
        let repo = self
            .repo
            .as_deref()
            .map(RepoUrl::parse)
            .transpose()
            .context("invalid --repo")?;
        let app_id = self
            .app_id
            .or_else(|| repo.as_ref().map(|r| r.app_code.clone()))
            .unwrap_or_else(|| name.clone());

        let mut ctx = TemplateContext::new(&name).with_app_id(app_id);
        if let Some(repo) = &repo {
            ctx = ctx.with_repo_url(repo.raw.clone());
        }
        if let Some(description) = self.description {
            ctx = ctx.with_description(description);
        }

        let engine = TemplateEngine::for_project(&root).context("failed to load templates")?;
        let opts = WriteOptions {
            force: self.force,
            dry_run: self.dry_run,
        };
        let writes = scaffold(&root, &engine, &ctx, ScaffoldKind::Init, opts)
            .with_context(|| format!("failed to initialise '{}'", root.display()))?;

        println!("✓ Project '{name}' at {}", root.display());
        print_writes(&root, &writes, self.dry_run);
        Ok(())
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
}

/// Create a project from its repository URL and pull the latest version.
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Repository URL: scheme://host[:port]/tenant/app-code.
    pub url: String,

    /// Target directory (defaults to the app code). Must be empty or absent.
    pub dir: Option<PathBuf>,
}

impl CloneArgs {
    pub fn run(self) -> Result<()> {
        let repo = RepoUrl::parse(&self.url).context("invalid repository URL")?;
        let target = self
            .dir
            .unwrap_or_else(|| PathBuf::from(&repo.app_code));
        let settings = settings::load().context("failed to load settings")?;

        let base = settings
            .api
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| repo.api_base.clone());
        let mut remote = HttpRemote::new(base)
            .with_metadata_timeout(Duration::from_secs(settings.api.timeout_secs));
        if let Some(key) = settings.api.key.as_deref().filter(|k| !k.is_empty()) {
            remote = remote.with_api_key(key);
        }

        let (_, report) = Orchestrator::clone_repo(
            &repo,
            &target,
            &settings,
            Arc::new(remote),
            CancelToken::new(),
        )
        .with_context(|| format!("failed to clone {} into '{}'", repo.raw, target.display()))?;

        println!(
            "✓ Cloned '{}' into {} (version {}, {} file(s))",
            repo.app_code,
            target.display(),
            report.version,
            report.files.len()
        );
        Ok(())
    }
}
