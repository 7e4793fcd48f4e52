//! Process-wide application context.
//!
//! Built once at startup from `tessera.json` and the user settings, then
//! passed by value or reference into every component that needs the project
//! root, application id, or remote endpoint. Nothing reaches for globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::project::{self, ProjectConfig, RepoUrl};
use crate::settings::{self, Settings};
use crate::types::AppId;

#[derive(Debug, Clone)]
pub struct AppContext {
    /// Absolute project root (directory containing `tessera.json`).
    pub root: PathBuf,
    pub project: ProjectConfig,
    pub settings: Settings,
}

impl AppContext {
    /// Locate the project from `start` and load settings from `home`.
    pub fn discover_at(start: &Path, home: &Path) -> Result<Self, ConfigError> {
        let root = project::find_root(start)?;
        let project = ProjectConfig::load(&root)?;
        let settings = settings::load_at(home)?;
        Ok(Self {
            root,
            project,
            settings,
        })
    }

    /// `discover_at` with the real home directory.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        Self::discover_at(start, &settings::home()?)
    }

    /// Build a context from parts that are already loaded.
    pub fn new(root: PathBuf, project: ProjectConfig, settings: Settings) -> Self {
        Self {
            root,
            project,
            settings,
        }
    }

    /// Application id: `meta.appId`, else the repository's app code.
    pub fn app_id(&self) -> Result<AppId, ConfigError> {
        if !self.project.meta.app_id.trim().is_empty() {
            return Ok(AppId::from(self.project.meta.app_id.trim()));
        }
        if !self.project.meta.app_code.trim().is_empty() {
            return Ok(AppId::from(self.project.meta.app_code.trim()));
        }
        match self.project.parsed_repo()? {
            Some(repo) => Ok(AppId::from(repo.app_code)),
            None => Err(ConfigError::MissingAppId),
        }
    }

    /// API base URL: the `api.url` setting, else `scheme://host[:port]` of
    /// the project's repository URL.
    pub fn api_base(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.settings.api.url.as_deref() {
            if !url.trim().is_empty() {
                return Ok(url.trim().trim_end_matches('/').to_string());
            }
        }
        match self.project.parsed_repo()? {
            Some(RepoUrl { api_base, .. }) => Ok(api_base),
            None => Err(ConfigError::MissingApiUrl),
        }
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.api.timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.settings.sync.watch_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_with_repo(url: &str) -> ProjectConfig {
        ProjectConfig::for_repo(&RepoUrl::parse(url).expect("repo"))
    }

    #[test]
    fn api_base_prefers_settings_override() {
        let mut settings = Settings::default();
        settings.api.url = Some("https://api.example.com/".to_string());
        let ctx = AppContext::new(
            PathBuf::from("/p"),
            project_with_repo("http://localhost:8080/t/app"),
            settings,
        );
        assert_eq!(ctx.api_base().unwrap(), "https://api.example.com");
    }

    #[test]
    fn api_base_falls_back_to_repo() {
        let ctx = AppContext::new(
            PathBuf::from("/p"),
            project_with_repo("http://localhost:8080/t/app"),
            Settings::default(),
        );
        assert_eq!(ctx.api_base().unwrap(), "http://localhost:8080");
        assert_eq!(ctx.app_id().unwrap(), AppId::from("app"));
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let ctx = AppContext::new(PathBuf::from("/p"), ProjectConfig::default(), Settings::default());
        assert!(matches!(ctx.api_base(), Err(ConfigError::MissingApiUrl)));
        assert!(matches!(ctx.app_id(), Err(ConfigError::MissingAppId)));
    }

    #[test]
    fn discover_loads_project_and_settings() {
        let home = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        let mut cfg = ProjectConfig::default();
        cfg.meta.app_id = "A-1".to_string();
        cfg.save(project_dir.path()).unwrap();

        let ctx = AppContext::discover_at(project_dir.path(), home.path()).unwrap();
        assert_eq!(ctx.root, project_dir.path());
        assert_eq!(ctx.app_id().unwrap(), AppId::from("A-1"));
        assert_eq!(ctx.metadata_timeout(), Duration::from_secs(30));
    }
}
