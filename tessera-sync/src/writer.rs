//! Scaffold writer.
//!
//! ## `write_file` protocol
//!
//! 1. Normalise line endings to LF.
//! 2. Skip if the target exists and `force` is off.
//! 3. Report instead of writing on a dry run.
//! 4. Write to `<path>.tessera.tmp`.
//! 5. Rename to the final path (atomic on POSIX).

use std::path::{Path, PathBuf};

use tessera_renderer::{ScaffoldKind, TemplateContext, TemplateEngine};

use crate::error::{io_err, SyncError};

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Written { path: PathBuf },
    /// Target already existed and `force` was off.
    Skipped { path: PathBuf },
    /// `--dry-run`: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Skipped { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub force: bool,
    pub dry_run: bool,
}

pub fn write_file(path: &Path, content: &str, opts: WriteOptions) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}.tessera.tmp", path.display()));
    write_file_with_tmp(path, content, opts, &tmp)
}

fn write_file_with_tmp(
    path: &Path,
    content: &str,
    opts: WriteOptions,
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    let normalized = content.replace("\r\n", "\n");

    if path.exists() && !opts.force {
        tracing::info!("exists, skipping: {}", path.display());
        return Ok(WriteResult::Skipped {
            path: path.to_path_buf(),
        });
    }

    if opts.dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, normalized).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Render `kind` for `ctx` and write every output under `root`.
pub fn scaffold(
    root: &Path,
    engine: &TemplateEngine,
    ctx: &TemplateContext,
    kind: ScaffoldKind,
    opts: WriteOptions,
) -> Result<Vec<WriteResult>, SyncError> {
    let outputs = engine.render(ctx, kind)?;
    tracing::debug!("scaffolding {kind} '{}' ({} file(s))", ctx.name, outputs.len());
    outputs
        .into_iter()
        .map(|(rel, content)| write_file(&root.join(rel), &content, opts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_renderer::ApiScriptKind;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) -> WriteResult {
        write_file(path, content, WriteOptions::default()).unwrap()
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("api/default/hello.api.js");
        assert!(matches!(write(&path, "hello"), WriteResult::Written { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn existing_file_is_skipped_without_force() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file.json");
        write(&path, "v1");
        assert!(matches!(write(&path, "v2"), WriteResult::Skipped { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");

        let forced = write_file(&path, "v2", WriteOptions { force: true, dry_run: false }).unwrap();
        assert!(matches!(forced, WriteResult::Written { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2");
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.json");
        let result = write_file(&path, "content", WriteOptions { force: false, dry_run: true }).unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
    }

    #[test]
    fn tmp_file_removed_and_crlf_normalised() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.sql");
        write(&path, "a\r\nb\r\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
        let tmp_path = PathBuf::from(format!("{}.tessera.tmp", path.display()));
        assert!(!tmp_path.exists(), ".tessera.tmp must be cleaned up");
    }

    #[test]
    fn scaffold_api_lands_under_group() {
        let tmp = TempDir::new().unwrap();
        let engine = TemplateEngine::new(None).unwrap();
        let ctx = TemplateContext::new("getDetail").with_group("user");
        let writes = scaffold(
            tmp.path(),
            &engine,
            &ctx,
            ScaffoldKind::Api(ApiScriptKind::Python),
            WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(writes.len(), 1);
        assert!(tmp.path().join("api/user/getDetail.api.py").is_file());
    }

    #[test]
    fn scaffold_rejects_escaping_names() {
        let tmp = TempDir::new().unwrap();
        let engine = TemplateEngine::new(None).unwrap();
        let ctx = TemplateContext::new("../evil");
        let err = scaffold(tmp.path(), &engine, &ctx, ScaffoldKind::Page, WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::Render(_)));
    }
}
