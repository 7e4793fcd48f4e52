//! Tessera core library: domain types, project config, user settings, errors.
//!
//! Public API surface:
//! - [`types`]: records exchanged between scanner, diff engine, and remote
//! - [`project`]: `tessera.json` and repository URL parsing
//! - [`settings`]: `~/.tessera/config.yaml`
//! - [`context`]: [`AppContext`] injected into the sync core
//! - [`error`]: [`ConfigError`]

pub mod context;
pub mod error;
pub mod project;
pub mod settings;
pub mod types;

pub use context::AppContext;
pub use error::ConfigError;
pub use project::{ProjectConfig, RepoUrl};
pub use settings::Settings;
pub use types::{
    AppId, Category, Change, ChangeKind, Conflict, DiffResult, FileRecord, SyncState, WatchEvent,
    WatchEventKind,
};
