//! # tessera-sync
//!
//! Content-addressed synchronization between a project tree and the
//! platform.
//!
//! Build an [`Orchestrator`] from a [`SyncContext`] and any [`Remote`]
//! ([`HttpRemote`] in production) and call `push`, `pull`, `status`, `diff`
//! or `resolve`. The lower layers ([`Scanner`], [`StateStore`], [`Package`],
//! the [`diff`] functions) are public for the watcher and for tests.

pub mod cancel;
pub mod diff;
pub mod error;
pub mod hasher;
pub mod orchestrator;
pub mod package;
pub mod remote;
pub mod scanner;
pub mod state;
pub mod validate;
pub mod writer;

pub use cancel::CancelToken;
pub use diff::FileDiff;
pub use error::{RemoteError, SyncError, SyncStep};
pub use orchestrator::{
    Orchestrator, Phase, PullReport, PushOptions, PushReport, ResolveReport, ResolveStrategy,
    StatusReport, SyncContext,
};
pub use package::{ExtractReport, Package};
pub use remote::{ConflictReport, HttpRemote, Remote, RemoteStatus, UploadFile, UploadRequest};
pub use scanner::{ScanScope, Scanner};
pub use state::StateStore;
pub use validate::{check_workflow, list_workflows, validate_project, Problem, ValidationReport, WorkflowSummary};
pub use writer::{scaffold, write_file, WriteOptions, WriteResult};
