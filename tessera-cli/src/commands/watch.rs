//! `tessera watch`: poll the project and report changes until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;

use tessera_core::WatchEventKind;
use tessera_sync::{Remote, ScanScope};
use tessera_watch::{WatchOptions, Watcher};

use super::{project_context, remote, scoped_orchestrator};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    /// Files under meta/, api/, page/ and workflow/.
    Project,
    /// Any .json .js .py .go .xml .bpmn file.
    Extensions,
}

impl From<ScopeArg> for ScanScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Project => ScanScope::Project,
            ScopeArg::Extensions => ScanScope::Extensions,
        }
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between scans (defaults to `sync.watch_interval_secs`).
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    #[arg(long, value_enum, default_value_t = ScopeArg::Extensions)]
    pub scope: ScopeArg,

    /// Report each change to the platform.
    #[arg(long)]
    pub forward: bool,

    /// Push after every batch of changes.
    #[arg(long)]
    pub auto_push: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let ctx = project_context()?;
        let interval = self
            .interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| ctx.watch_interval());
        let scope: ScanScope = self.scope.into();
        let options = WatchOptions {
            interval,
            scope,
            forward: self.forward,
            auto_push: self.auto_push,
        };

        let mut watcher = Watcher::new(&ctx.root, options).context("failed to start watcher")?;
        if self.forward {
            let remote: Arc<dyn Remote> = Arc::new(remote(&ctx)?);
            watcher = watcher.with_remote(remote);
        }
        if self.auto_push {
            watcher = watcher.with_orchestrator(Arc::new(scoped_orchestrator(&ctx, scope)?));
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = watcher.with_sink(tx);
        let printer = std::thread::spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                let mark = match event.kind {
                    WatchEventKind::Created => "+".green().bold(),
                    WatchEventKind::Modified => "~".yellow().bold(),
                    WatchEventKind::Deleted => "-".red().bold(),
                };
                println!("  {mark} {} {}", event.kind, event.path);
            }
        });

        println!(
            "Watching {} every {}s (Ctrl-C to stop)",
            ctx.root.display(),
            interval.as_secs_f32()
        );
        let summary = watcher.start_blocking().context("watcher failed")?;
        let _ = printer.join();
        println!(
            "✓ Stopped after {} scan(s), {} change(s)",
            summary.ticks, summary.events
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{AppContext, ProjectConfig, RepoUrl, Settings};

    #[test]
    fn auto_push_scans_the_watched_scope() {
        let repo = RepoUrl::parse("http://127.0.0.1:9/acme/shop").expect("repo");
        let ctx = AppContext::new(
            std::env::temp_dir(),
            ProjectConfig::for_repo(&repo),
            Settings::default(),
        );
        for arg in [ScopeArg::Extensions, ScopeArg::Project] {
            let scope: ScanScope = arg.into();
            let orch = scoped_orchestrator(&ctx, scope).expect("orchestrator");
            assert_eq!(orch.context().scope, scope);
        }
    }
}
