//! Scaffold rendering errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Tera(#[from] tera::Error),

    /// The [`crate::TemplateContext`] could not be turned into template variables.
    #[error("cannot build template variables: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a project-local override from `.tessera/templates/`.
    #[error("cannot read template override {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// A scaffold name or group that cannot be used as a path segment.
    #[error("invalid {what} '{value}': use letters, digits, '_', '-' or '.'")]
    InvalidName { what: &'static str, value: String },

    #[error("unknown API script kind '{0}' (expected js, python or go)")]
    UnknownScriptKind(String),
}
