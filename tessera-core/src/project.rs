//! Project config (`tessera.json`) and repository URL parsing.
//!
//! # Layout
//!
//! ```text
//! <project>/
//!   tessera.json              (project config, committed)
//!   .tessera/
//!     sync-state.json         (sync side-file, not committed)
//!     templates/*.tera        (optional scaffold overrides)
//!   meta/  api/  page/  workflow/
//! ```
//!
//! `tessera.json` is read once per process by [`ProjectConfig::load`] and
//! handed to the sync core through [`crate::AppContext`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{io_err, ConfigError};

/// File name of the project config at the project root.
pub const PROJECT_FILE: &str = "tessera.json";

/// Directory holding tool bookkeeping inside a project.
pub const STATE_DIR: &str = ".tessera";

// ---------------------------------------------------------------------------
// Config shape
// ---------------------------------------------------------------------------

/// Application identity block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSection {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSection {
    #[serde(default)]
    pub repo: RepoSection,
}

/// Parsed `tessera.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub meta: AppMeta,
    #[serde(default)]
    pub config: ConfigSection,
    /// Older projects store the repository URL as a top-level string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl ProjectConfig {
    /// Build a fresh config for an application cloned from `repo`.
    pub fn for_repo(repo: &RepoUrl) -> Self {
        Self {
            meta: AppMeta {
                app_id: String::new(),
                app_code: repo.app_code.clone(),
                name: repo.app_code.clone(),
                version: String::new(),
            },
            config: ConfigSection {
                repo: RepoSection {
                    url: repo.raw.clone(),
                },
            },
            repo: None,
        }
    }

    /// `<root>/tessera.json`: pure, no I/O.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(PROJECT_FILE)
    }

    /// Load `<root>/tessera.json`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(root);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json { path, source })
    }

    /// Atomically write `<root>/tessera.json` (`.tmp` sibling + rename).
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(root);
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, format!("{json}\n")).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Repository URL string, preferring `config.repo.url` over the legacy
    /// top-level `repo` field.
    pub fn repo_url(&self) -> Option<&str> {
        if !self.config.repo.url.trim().is_empty() {
            return Some(self.config.repo.url.trim());
        }
        self.repo
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Parsed repository URL, if one is configured.
    pub fn parsed_repo(&self) -> Result<Option<RepoUrl>, ConfigError> {
        self.repo_url().map(RepoUrl::parse).transpose()
    }
}

/// Walk up from `start` until a directory containing `tessera.json` is found.
pub fn find_root(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if ProjectConfig::path_in(dir).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(ConfigError::ProjectNotFound {
        start: start.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Repository URL
// ---------------------------------------------------------------------------

/// `scheme://host[:port]/tenant/appCode`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// The URL as written by the user (trimmed, scheme defaulted).
    pub raw: String,
    pub tenant: String,
    pub app_code: String,
    /// `scheme://host[:port]`: base for all API calls.
    pub api_base: String,
}

impl RepoUrl {
    /// Parse a repository URL. A missing scheme defaults to `http://`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let invalid = |reason: &str| ConfigError::InvalidRepoUrl {
            url: input.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid("URL is empty"));
        }

        let raw = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let url = Url::parse(&raw).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

        let segments: Vec<&str> = url
            .path()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let [tenant, app_code, ..] = segments.as_slice() else {
            return Err(invalid("path must contain tenant and app code (/tenant/app-code)"));
        };

        let api_base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self {
            raw,
            tenant: (*tenant).to_string(),
            app_code: (*app_code).to_string(),
            api_base,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_full_repo_url() {
        let repo = RepoUrl::parse("http://localhost:8080/default/crm").expect("parse");
        assert_eq!(repo.tenant, "default");
        assert_eq!(repo.app_code, "crm");
        assert_eq!(repo.api_base, "http://localhost:8080");
    }

    #[test]
    fn parse_defaults_scheme_and_ignores_trailing_slash() {
        let repo = RepoUrl::parse("  platform.example.com/acme/hr/ ").expect("parse");
        assert_eq!(repo.api_base, "http://platform.example.com");
        assert_eq!(repo.tenant, "acme");
        assert_eq!(repo.app_code, "hr");
        assert_eq!(repo.raw, "http://platform.example.com/acme/hr/");
    }

    #[test]
    fn parse_rejects_missing_app_code() {
        let err = RepoUrl::parse("https://example.com/only-tenant").expect_err("invalid");
        assert!(err.to_string().contains("tenant and app code"));
    }

    #[test]
    fn legacy_top_level_repo_is_honoured() {
        let cfg: ProjectConfig =
            serde_json::from_str(r#"{"meta":{"appId":"42"},"repo":"http://h/t/a"}"#)
                .expect("parse");
        assert_eq!(cfg.repo_url(), Some("http://h/t/a"));
        assert_eq!(cfg.meta.app_id, "42");
    }

    #[test]
    fn nested_repo_wins_over_legacy() {
        let cfg: ProjectConfig = serde_json::from_str(
            r#"{"config":{"repo":{"url":"http://new/t/a"}},"repo":"http://old/t/a"}"#,
        )
        .expect("parse");
        assert_eq!(cfg.repo_url(), Some("http://new/t/a"));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = TempDir::new().expect("tmp");
        let repo = RepoUrl::parse("http://localhost:8080/default/crm").expect("parse");
        let cfg = ProjectConfig::for_repo(&repo);
        cfg.save(tmp.path()).expect("save");
        let loaded = ProjectConfig::load(tmp.path()).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!tmp.path().join("tessera.json.tmp").exists());
    }

    #[test]
    fn find_root_walks_up() {
        let tmp = TempDir::new().expect("tmp");
        ProjectConfig::default().save(tmp.path()).expect("save");
        let nested = tmp.path().join("meta").join("User");
        std::fs::create_dir_all(&nested).expect("mkdir");
        assert_eq!(find_root(&nested).expect("root"), tmp.path());
    }

    #[test]
    fn find_root_reports_missing_project() {
        let tmp = TempDir::new().expect("tmp");
        let err = find_root(tmp.path()).expect_err("no project");
        assert!(matches!(err, ConfigError::ProjectNotFound { .. }));
    }
}
