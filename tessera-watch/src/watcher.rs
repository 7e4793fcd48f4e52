//! Polling watcher: re-scan the tree every interval and turn the difference
//! between consecutive scans into [`WatchEvent`]s.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use tessera_core::{WatchEvent, WatchEventKind};
use tessera_sync::diff::{self, HashIndex};
use tessera_sync::{CancelToken, Orchestrator, PushOptions, Remote, ScanScope, Scanner};

use crate::error::{io_err, WatchError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const AUTO_PUSH_MESSAGE: &str = "auto-push from watcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    pub scope: ScanScope,
    /// Report each event to the remote's sync-event endpoint.
    pub forward: bool,
    /// Push after every tick that produced events.
    pub auto_push: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            scope: ScanScope::Extensions,
            forward: false,
            auto_push: false,
        }
    }
}

/// Totals for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub ticks: u64,
    pub events: u64,
}

pub struct Watcher {
    scanner: Scanner,
    options: WatchOptions,
    previous: HashIndex,
    remote: Option<Arc<dyn Remote>>,
    orchestrator: Option<Arc<Orchestrator>>,
    sink: Option<mpsc::UnboundedSender<WatchEvent>>,
    cancel: CancelToken,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("root", &self.scanner.root())
            .field("options", &self.options)
            .field("tracked", &self.previous.len())
            .finish()
    }
}

impl Watcher {
    /// Take the baseline scan; files present now never produce events.
    pub fn new(root: impl Into<PathBuf>, options: WatchOptions) -> Result<Self, WatchError> {
        if options.interval.is_zero() {
            return Err(WatchError::ZeroInterval);
        }
        let scanner = Scanner::new(root).scope(options.scope);
        let previous = scanner.scan_map()?;
        tracing::debug!(
            root = %scanner.root().display(),
            files = previous.len(),
            "baseline scan complete"
        );
        Ok(Self {
            scanner,
            options,
            previous,
            remote: None,
            orchestrator: None,
            sink: None,
            cancel: CancelToken::new(),
        })
    }

    /// Remote used when `forward` is set.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Orchestrator used when `auto_push` is set.
    #[must_use]
    pub fn with_orchestrator(mut self, orchestrator: Arc<Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Receive every event as it is emitted.
    #[must_use]
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<WatchEvent>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Re-scan synchronously and return the events since the last scan.
    pub fn tick(&mut self) -> Result<Vec<WatchEvent>, WatchError> {
        let current = self.scanner.scan_map()?;
        Ok(self.advance(current))
    }

    /// Replace the previous map with `current`, returning created, modified
    /// and deleted events in that order, each sorted by path.
    fn advance(&mut self, current: HashIndex) -> Vec<WatchEvent> {
        let delta = diff::diff(&current, &self.previous);
        self.previous = current;

        let tagged = |paths: Vec<String>, kind: WatchEventKind| {
            paths.into_iter().map(move |path| WatchEvent { kind, path })
        };
        tagged(delta.added, WatchEventKind::Created)
            .chain(tagged(delta.modified, WatchEventKind::Modified))
            .chain(tagged(delta.deleted, WatchEventKind::Deleted))
            .collect()
    }

    /// Poll until `shutdown` fires or its sender is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<WatchSummary, WatchError> {
        let mut summary = WatchSummary::default();
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the baseline already covers it.
        ticker.tick().await;

        tracing::info!(
            root = %self.root().display(),
            interval_ms = self.options.interval.as_millis() as u64,
            "watching"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let scanner = self.scanner.clone();
                    let scanned = tokio::task::spawn_blocking(move || scanner.scan_map())
                        .await
                        .map_err(|err| WatchError::Join { task: "scan", reason: err.to_string() })?;
                    summary.ticks += 1;

                    let current = match scanned {
                        Ok(current) => current,
                        Err(err) => {
                            tracing::warn!(error = %err, "scan failed; keeping previous state");
                            continue;
                        }
                    };
                    let events = self.advance(current);
                    if events.is_empty() {
                        continue;
                    }
                    summary.events += events.len() as u64;
                    self.dispatch(&events).await;
                }
            }
        }

        self.cancel.cancel();
        tracing::info!(ticks = summary.ticks, events = summary.events, "watcher stopped");
        Ok(summary)
    }

    /// Watch until Ctrl-C.
    pub async fn run_until_ctrl_c(self) -> Result<WatchSummary, WatchError> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, stopping watcher");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => {
                        let _ = shutdown.send(());
                        Err(WatchError::Signal(err.to_string()))
                    }
                }
            })
        };

        let summary = self.run(shutdown_rx).await?;
        if !signal_handle.is_finished() {
            signal_handle.abort();
            return Ok(summary);
        }
        match signal_handle.await {
            Ok(result) => result.map(|()| summary),
            Err(err) => Err(WatchError::Join {
                task: "signal_handler",
                reason: err.to_string(),
            }),
        }
    }

    /// Run on a fresh runtime and block the current thread until Ctrl-C.
    pub fn start_blocking(self) -> Result<WatchSummary, WatchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;
        runtime.block_on(self.run_until_ctrl_c())
    }

    /// Sink, forwarding and auto-push for one tick's events. Failures are
    /// logged and never stop the loop.
    async fn dispatch(&self, events: &[WatchEvent]) {
        for event in events {
            tracing::info!(kind = %event.kind, path = %event.path, "change detected");
            if let Some(sink) = &self.sink {
                let _ = sink.send(event.clone());
            }
        }

        if self.options.forward {
            if let Some(remote) = &self.remote {
                let remote = remote.clone();
                let events = events.to_vec();
                let root = self.root().display().to_string();
                let cancel = self.cancel.clone();
                let forwarded = tokio::task::spawn_blocking(move || {
                    for event in &events {
                        if let Err(err) = remote.notify_event(event, &root, &cancel) {
                            tracing::warn!(path = %event.path, error = %err, "event forwarding failed");
                        }
                    }
                })
                .await;
                if let Err(err) = forwarded {
                    tracing::warn!(error = %err, "event forwarding task failed");
                }
            }
        }

        if self.options.auto_push {
            if let Some(orchestrator) = &self.orchestrator {
                let orchestrator = orchestrator.clone();
                let pushed = tokio::task::spawn_blocking(move || {
                    orchestrator.push(&PushOptions {
                        message: AUTO_PUSH_MESSAGE.to_string(),
                        ..PushOptions::default()
                    })
                })
                .await;
                match pushed {
                    Ok(Ok(report)) => match report.version {
                        Some(version) => tracing::info!(%version, changes = report.changes.len(), "auto-push complete"),
                        None => tracing::debug!("auto-push: nothing to push"),
                    },
                    Ok(Err(err)) => tracing::warn!(error = %err, "auto-push failed"),
                    Err(err) => tracing::warn!(error = %err, "auto-push task failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn opts() -> WatchOptions {
        WatchOptions {
            interval: Duration::from_millis(20),
            ..WatchOptions::default()
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let options = WatchOptions {
            interval: Duration::ZERO,
            ..WatchOptions::default()
        };
        assert!(matches!(
            Watcher::new(tmp.path(), options),
            Err(WatchError::ZeroInterval)
        ));
    }

    #[test]
    fn baseline_files_produce_no_events() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "api/a.js", "x");
        let mut watcher = Watcher::new(tmp.path(), opts()).unwrap();
        assert!(watcher.tick().unwrap().is_empty());
    }

    #[test]
    fn one_tick_orders_created_modified_deleted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "m.json", "1");
        write(tmp.path(), "d.xml", "1");
        let mut watcher = Watcher::new(tmp.path(), opts()).unwrap();

        write(tmp.path(), "z.js", "new");
        write(tmp.path(), "a.js", "new");
        write(tmp.path(), "m.json", "2");
        std::fs::remove_file(tmp.path().join("d.xml")).unwrap();

        let events = watcher.tick().unwrap();
        let seen: Vec<(WatchEventKind, &str)> =
            events.iter().map(|e| (e.kind, e.path.as_str())).collect();
        assert_eq!(
            seen,
            vec![
                (WatchEventKind::Created, "a.js"),
                (WatchEventKind::Created, "z.js"),
                (WatchEventKind::Modified, "m.json"),
                (WatchEventKind::Deleted, "d.xml"),
            ]
        );
    }

    #[test]
    fn missing_root_fails_baseline() {
        let tmp = TempDir::new().unwrap();
        let err = Watcher::new(tmp.path().join("gone"), opts()).unwrap_err();
        assert!(matches!(err, WatchError::Sync(_)));
    }
}
