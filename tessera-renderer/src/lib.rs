//! # tessera-renderer
//!
//! Tera-based scaffolding for Tessera projects: the `init` skeleton, data
//! models, API scripts, pages and workflows.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tessera_renderer::{ApiScriptKind, ScaffoldKind, TemplateContext, TemplateEngine};
//!
//! fn scaffold(root: &Path) -> Result<(), tessera_renderer::RenderError> {
//!     let engine = TemplateEngine::for_project(root)?;
//!     let ctx = TemplateContext::new("getList").with_group("user");
//!     for (path, content) in engine.render(&ctx, ScaffoldKind::Api(ApiScriptKind::Js))? {
//!         println!("{}: {} bytes", path.display(), content.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateContext;
pub use engine::{validate_name, ApiScriptKind, ScaffoldKind, TemplateEngine, SKELETON_DIRS};
pub use error::RenderError;
