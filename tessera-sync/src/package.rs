//! Packager / extractor: zip archives of a project subset.
//!
//! A [`Package`] lives in a temporary file that is removed when the value is
//! dropped, on success and error paths alike. Parent directory entries are
//! written once each, ahead of the first file inside them, and unix modes are
//! kept in the entry headers.
//!
//! Extraction is not transactional: if an entry fails, entries already
//! written stay on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SyncError;
use crate::hasher;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// One file read back from a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

/// A write-once zip archive backed by a temporary file.
#[derive(Debug)]
pub struct Package {
    file: NamedTempFile,
    files: usize,
    dirs: usize,
}

impl Package {
    /// Archive `paths` (root-relative, POSIX) from `root`.
    ///
    /// Any unreadable file fails the whole package.
    pub fn build(root: &Path, paths: &[String]) -> Result<Self, SyncError> {
        let mut tmp = NamedTempFile::new().map_err(|source| SyncError::Package {
            path: std::env::temp_dir(),
            source,
        })?;
        let tmp_path = tmp.path().to_path_buf();
        let zip_err = |e: zip::result::ZipError| SyncError::Package {
            path: tmp_path.clone(),
            source: std::io::Error::other(e),
        };

        let mut seen_dirs: BTreeSet<String> = BTreeSet::new();
        let mut files = 0;
        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            for rel in paths {
                for dir in parent_dirs(rel) {
                    if seen_dirs.insert(dir.clone()) {
                        let options = SimpleFileOptions::default().unix_permissions(DEFAULT_DIR_MODE);
                        writer.add_directory(format!("{dir}/"), options).map_err(zip_err)?;
                    }
                }

                let src = root.join(rel);
                let read_err = |source| SyncError::Package {
                    path: src.clone(),
                    source,
                };
                let content = std::fs::read(&src).map_err(read_err)?;
                let mode = file_mode(&src).map_err(read_err)?;

                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .unix_permissions(mode);
                writer.start_file(rel.as_str(), options).map_err(zip_err)?;
                writer.write_all(&content).map_err(|source| SyncError::Package {
                    path: tmp_path.clone(),
                    source,
                })?;
                files += 1;
            }
            writer.finish().map_err(zip_err)?;
        }

        tracing::debug!(
            "packaged {files} file(s), {} dir(s) into {}",
            seen_dirs.len(),
            tmp_path.display()
        );
        Ok(Self {
            file: tmp,
            files,
            dirs: seen_dirs.len(),
        })
    }

    /// Location of the archive on disk; gone once the package drops.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files == 0
    }

    pub fn dir_count(&self) -> usize {
        self.dirs
    }

    /// The raw archive bytes.
    pub fn bytes(&self) -> Result<Vec<u8>, SyncError> {
        let mut file = self.reopen()?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|source| self.package_err(source))?;
        Ok(buf)
    }

    /// Read back every file entry in archive order.
    pub fn entries(&self) -> Result<Vec<PackageEntry>, SyncError> {
        let file = self.reopen()?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| self.package_err(std::io::Error::other(e)))?;
        let mut out = Vec::with_capacity(self.files);
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| self.package_err(std::io::Error::other(e)))?;
            if entry.is_dir() {
                continue;
            }
            let mut content = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut content)
                .map_err(|source| self.package_err(source))?;
            out.push(PackageEntry {
                path: entry.name().to_string(),
                content,
                mode: entry.unix_mode().unwrap_or(DEFAULT_FILE_MODE) & 0o7777,
            });
        }
        Ok(out)
    }

    fn reopen(&self) -> Result<File, SyncError> {
        let mut file = self.file.reopen().map_err(|source| self.package_err(source))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| self.package_err(source))?;
        Ok(file)
    }

    fn package_err(&self, source: std::io::Error) -> SyncError {
        SyncError::Package {
            path: self.file.path().to_path_buf(),
            source,
        }
    }
}

/// `a/b/c.json` -> `["a", "a/b"]`.
fn parent_dirs(rel: &str) -> Vec<String> {
    let parts: Vec<&str> = rel.split('/').collect();
    (1..parts.len()).map(|n| parts[..n].join("/")).collect()
}

#[cfg(unix)]
fn file_mode(path: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(path: &Path) -> std::io::Result<u32> {
    std::fs::metadata(path).map(|_| DEFAULT_FILE_MODE)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// What an extraction wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Extracted file path -> hash of the written content.
    pub files: BTreeMap<String, String>,
    pub dirs: usize,
}

/// Extract every entry of `bytes` under `target`.
pub fn extract(bytes: &[u8], target: &Path) -> Result<ExtractReport, SyncError> {
    extract_matching(bytes, target, |_| true)
}

/// Extract only the file entries whose path satisfies `keep`.
///
/// A directory entry is created when `keep` accepts it or a kept file lives
/// below it. Entry names that would land outside `target` are rejected before
/// anything is written for them.
pub fn extract_matching(
    bytes: &[u8],
    target: &Path,
    keep: impl Fn(&str) -> bool,
) -> Result<ExtractReport, SyncError> {
    let mut archive = open_archive(bytes)?;
    let kept: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .filter_map(|name| safe_relative(name).map(|rel| to_posix(&rel)))
        .filter(|path| keep(path))
        .collect();
    let mut report = ExtractReport::default();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extract_err("<archive>", std::io::Error::other(e)))?;
        let name = entry.name().to_string();
        let rel = safe_relative(&name).ok_or_else(|| {
            extract_err(
                &name,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "entry path escapes the target directory",
                ),
            )
        })?;
        let rel_posix = to_posix(&rel);
        let dest = target.join(&rel);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            let prefix = format!("{rel_posix}/");
            if !keep(&rel_posix) && !kept.iter().any(|p| p.starts_with(&prefix)) {
                continue;
            }
            std::fs::create_dir_all(&dest).map_err(|e| extract_err(&name, e))?;
            report.dirs += 1;
            continue;
        }
        if !keep(&rel_posix) {
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| extract_err(&name, e))?;
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| extract_err(&name, e))?;
        std::fs::write(&dest, &content).map_err(|e| extract_err(&name, e))?;
        if let Some(mode) = mode {
            set_mode(&dest, mode).map_err(|e| extract_err(&name, e))?;
        }
        report.files.insert(rel_posix, hasher::hash_bytes(&content));
    }

    tracing::debug!(
        "extracted {} file(s), {} dir(s) into {}",
        report.files.len(),
        report.dirs,
        target.display()
    );
    Ok(report)
}

/// Read every file entry into memory without touching the filesystem.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, SyncError> {
    let mut archive = open_archive(bytes)?;
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extract_err("<archive>", std::io::Error::other(e)))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(rel) = safe_relative(&name) else {
            tracing::warn!("skipping archive entry outside the project: {name}");
            continue;
        };
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| extract_err(&name, e))?;
        out.insert(to_posix(&rel), content);
    }
    Ok(out)
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, SyncError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| extract_err("<archive>", std::io::Error::other(e)))
}

fn extract_err(entry: &str, source: std::io::Error) -> SyncError {
    SyncError::Extract {
        entry: entry.to_string(),
        source,
    }
}

/// Relative path for an entry name, or `None` when it is absolute or climbs
/// out of the target.
fn safe_relative(name: &str) -> Option<PathBuf> {
    if name.contains('\0') || name.contains('\\') {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_then_extract_reproduces_tree() {
        let src = TempDir::new().unwrap();
        write(src.path(), "meta/User/User.columns.json", b"{\"columns\":[]}");
        write(src.path(), "meta/User/User.view.sql", b"select 1");
        write(src.path(), "api/user/get.api.js", b"ok");

        let list = paths(&[
            "api/user/get.api.js",
            "meta/User/User.columns.json",
            "meta/User/User.view.sql",
        ]);
        let pkg = Package::build(src.path(), &list).unwrap();
        assert_eq!(pkg.len(), 3);
        assert_eq!(pkg.dir_count(), 4);

        let dst = TempDir::new().unwrap();
        let report = extract(&pkg.bytes().unwrap(), dst.path()).unwrap();
        assert_eq!(report.files.keys().cloned().collect::<Vec<_>>(), list);
        for rel in &list {
            assert_eq!(
                std::fs::read(dst.path().join(rel)).unwrap(),
                std::fs::read(src.path().join(rel)).unwrap(),
                "{rel}"
            );
            assert_eq!(report.files[rel], hasher::hash_file(&src.path().join(rel)).unwrap());
        }
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let src = TempDir::new().unwrap();
        write(src.path(), "api/a.js", b"a");
        let pkg = Package::build(src.path(), &paths(&["api/a.js"])).unwrap();
        let on_disk = pkg.path().to_path_buf();
        assert!(on_disk.exists());
        drop(pkg);
        assert!(!on_disk.exists());
    }

    #[test]
    fn missing_file_fails_packaging() {
        let src = TempDir::new().unwrap();
        let err = Package::build(src.path(), &paths(&["api/missing.js"])).unwrap_err();
        match err {
            SyncError::Package { path, .. } => assert!(path.ends_with("api/missing.js")),
            other => panic!("expected Package error, got {other:?}"),
        }
    }

    #[test]
    fn entries_read_back_content() {
        let src = TempDir::new().unwrap();
        write(src.path(), "page/p/p.page.json", b"{}");
        let pkg = Package::build(src.path(), &paths(&["page/p/p.page.json"])).unwrap();
        let entries = pkg.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "page/p/p.page.json");
        assert_eq!(entries[0].content, b"{}");
    }

    #[test]
    #[cfg(unix)]
    fn unix_mode_survives_round_trip() {
        use std::os::unix::fs::PermissionsExt;
        let src = TempDir::new().unwrap();
        write(src.path(), "api/run.py", b"print()");
        std::fs::set_permissions(
            src.path().join("api/run.py"),
            std::fs::Permissions::from_mode(0o750),
        )
        .unwrap();

        let pkg = Package::build(src.path(), &paths(&["api/run.py"])).unwrap();
        assert_eq!(pkg.entries().unwrap()[0].mode, 0o750);

        let dst = TempDir::new().unwrap();
        extract(&pkg.bytes().unwrap(), dst.path()).unwrap();
        let mode = std::fs::metadata(dst.path().join("api/run.py"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn rejects_entries_escaping_target() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buf);
            writer
                .start_file("../evil.txt", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"x").unwrap();
            writer.finish().unwrap();
        }
        let outer = TempDir::new().unwrap();
        let target = outer.path().join("target");
        std::fs::create_dir_all(&target).unwrap();

        let err = extract(buf.get_ref(), &target).unwrap_err();
        assert!(matches!(err, SyncError::Extract { .. }));
        assert!(!outer.path().join("evil.txt").exists());
    }

    #[test]
    fn extract_matching_filters_files() {
        let src = TempDir::new().unwrap();
        write(src.path(), "api/a.js", b"a");
        write(src.path(), "api/b.js", b"b");
        let pkg = Package::build(src.path(), &paths(&["api/a.js", "api/b.js"])).unwrap();

        let dst = TempDir::new().unwrap();
        let report = extract_matching(&pkg.bytes().unwrap(), dst.path(), |p| p == "api/b.js").unwrap();
        assert_eq!(report.files.len(), 1);
        assert!(!dst.path().join("api/a.js").exists());
        assert!(dst.path().join("api/b.js").exists());
    }

    #[test]
    fn extract_matching_skips_directories_without_kept_files() {
        let src = TempDir::new().unwrap();
        write(src.path(), "meta/User/User.define.json", b"{}");
        write(src.path(), "page/home/home.page.json", b"{}");
        let pkg = Package::build(
            src.path(),
            &paths(&["meta/User/User.define.json", "page/home/home.page.json"]),
        )
        .unwrap();

        let dst = TempDir::new().unwrap();
        let report = extract_matching(&pkg.bytes().unwrap(), dst.path(), |p| {
            p == "meta/User/User.define.json"
        })
        .unwrap();
        assert!(dst.path().join("meta/User/User.define.json").is_file());
        assert!(!dst.path().join("page").exists());
        assert_eq!(report.dirs, 2, "meta and meta/User only");
    }

    #[test]
    fn read_archive_and_garbage_input() {
        let src = TempDir::new().unwrap();
        write(src.path(), "workflow/w/w.workflow.json", b"{}");
        let pkg = Package::build(src.path(), &paths(&["workflow/w/w.workflow.json"])).unwrap();
        let files = read_archive(&pkg.bytes().unwrap()).unwrap();
        assert_eq!(files["workflow/w/w.workflow.json"], b"{}");

        assert!(matches!(
            read_archive(b"not a zip"),
            Err(SyncError::Extract { .. })
        ));
    }

    #[test]
    fn parent_dirs_listed_outermost_first() {
        assert_eq!(parent_dirs("a/b/c.json"), vec!["a", "a/b"]);
        assert!(parent_dirs("top.json").is_empty());
    }
}
