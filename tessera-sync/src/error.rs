//! Error types for tessera-sync.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tessera_core::{ConfigError, Conflict};
use tessera_renderer::RenderError;

/// The step of a sync operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    Scanning,
    Packaging,
    Comparing,
    Uploading,
    Downloading,
    Extracting,
    Persisting,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Scanning => "scanning",
            SyncStep::Packaging => "packaging",
            SyncStep::Comparing => "comparing",
            SyncStep::Uploading => "uploading",
            SyncStep::Downloading => "downloading",
            SyncStep::Extracting => "extracting",
            SyncStep::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Failures of a single remote call.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP 409: the server rejected the change set as conflicting.
    #[error("sync conflict: {0}")]
    Conflict(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Map an HTTP error status and response body to a typed error.
    ///
    /// The message is the body's JSON `message` field when present, else the
    /// raw body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "unknown error".to_string()
                } else {
                    trimmed.to_string()
                }
            });
        match status {
            401 => RemoteError::Auth(message),
            403 => RemoteError::Permission(message),
            404 => RemoteError::NotFound(message),
            409 => RemoteError::Conflict(message),
            _ => RemoteError::Server { status, message },
        }
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The project root (or a directory it needs) could not be read.
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot package {path}: {source}")]
    Package {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot extract '{entry}': {source}")]
    Extract {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    /// A remote call failed; `step` names the sync step it belonged to.
    #[error("{step} failed: {source}")]
    Remote {
        step: SyncStep,
        #[source]
        source: RemoteError,
    },

    /// The sync side-file could not be written.
    #[error("cannot write sync state {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} cancelled")]
    Cancelled { step: SyncStep },

    #[error("{} conflicting path(s); resolve them or push with --force", .0.len())]
    Conflicts(Vec<Conflict>),

    #[error("target directory {0} already exists and is not empty")]
    TargetNotEmpty(PathBuf),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Attribute a remote failure to `step`; cancellation gets its own kind.
    pub fn remote(step: SyncStep, source: RemoteError) -> Self {
        match source {
            RemoteError::Cancelled => SyncError::Cancelled { step },
            source => SyncError::Remote { step, source },
        }
    }

    /// True for the HTTP 409 sync-conflict rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SyncError::Remote {
                source: RemoteError::Conflict(_),
                ..
            } | SyncError::Conflicts(_)
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
