use std::path::PathBuf;

use thiserror::Error;

/// Error surface of the polling watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The baseline scan failed; later scan failures are only logged.
    #[error("sync error: {0}")]
    Sync(#[from] tessera_sync::SyncError),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },

    #[error("ctrl-c handler failed: {0}")]
    Signal(String),

    #[error("watch interval must be greater than zero")]
    ZeroInterval,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
