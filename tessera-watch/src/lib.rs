//! Polling watcher for a project tree, with optional event forwarding and
//! auto-push.

mod error;
pub mod watcher;

pub use error::WatchError;
pub use watcher::{WatchOptions, WatchSummary, Watcher, DEFAULT_INTERVAL};
