//! Error types for tessera-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from project config and settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path being accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `tessera.json` exists but is not valid JSON for the expected shape.
    #[error("failed to parse project config at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// User settings YAML could not be parsed or serialized.
    #[error("failed to read settings at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.tessera/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No `tessera.json` was found in the start directory or any parent.
    #[error("not a tessera project: no tessera.json found from {start}")]
    ProjectNotFound { start: PathBuf },

    /// The repository URL is not of the form `scheme://host[:port]/tenant/appCode`.
    #[error("invalid repository URL '{url}': {reason}")]
    InvalidRepoUrl { url: String, reason: String },

    /// Neither settings nor project config yield a usable API base URL.
    #[error("no API URL configured; set `api.url` or a repository URL in tessera.json")]
    MissingApiUrl,

    /// Neither `meta.appId` nor the repository URL yield an application id.
    #[error("no application id configured in tessera.json")]
    MissingAppId,

    /// Dotted settings key is not recognised.
    #[error("unknown settings key '{0}'")]
    UnknownKey(String),

    /// Value could not be parsed for the given settings key.
    #[error("invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
