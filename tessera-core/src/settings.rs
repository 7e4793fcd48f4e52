//! User-level settings stored at `~/.tessera/config.yaml`.
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Default timeout for metadata calls, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default watcher poll interval, in seconds.
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 2;

/// Every key accepted by [`Settings::get`] / [`Settings::set`].
pub const KEYS: &[&str] = &[
    "api.url",
    "api.key",
    "api.timeout_secs",
    "sync.branch",
    "sync.author",
    "sync.watch_interval_secs",
    "logging.level",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Overrides the API base derived from the project's repository URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub branch: String,
    pub author: String,
    pub watch_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            author: "developer".to_string(),
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Root of `~/.tessera/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub sync: SyncSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Read a dotted key. Unset optional values return `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let value = match key {
            "api.url" => self.api.url.clone(),
            "api.key" => self.api.key.clone(),
            "api.timeout_secs" => Some(self.api.timeout_secs.to_string()),
            "sync.branch" => Some(self.sync.branch.clone()),
            "sync.author" => Some(self.sync.author.clone()),
            "sync.watch_interval_secs" => Some(self.sync.watch_interval_secs.to_string()),
            "logging.level" => Some(self.logging.level.clone()),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        };
        Ok(value)
    }

    /// Set a dotted key. An empty value clears optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let optional = || (!value.is_empty()).then(|| value.to_string());
        match key {
            "api.url" => self.api.url = optional().map(|v| v.trim_end_matches('/').to_string()),
            "api.key" => self.api.key = optional(),
            "api.timeout_secs" => self.api.timeout_secs = parse_secs(key, value)?,
            "sync.branch" => self.sync.branch = value.to_string(),
            "sync.author" => self.sync.author = value.to_string(),
            "sync.watch_interval_secs" => self.sync.watch_interval_secs = parse_secs(key, value)?,
            "logging.level" => self.logging.level = value.to_ascii_lowercase(),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// All keys with their current values, in [`KEYS`] order.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>)> {
        KEYS.iter()
            .map(|key| (*key, self.get(key).unwrap_or_default()))
            .collect()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a positive number of seconds",
        }),
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `<home>/.tessera/config.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".tessera").join("config.yaml")
}

/// Load settings, returning defaults when the file does not exist.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

/// Atomically save settings (`.yaml.tmp` sibling → `chmod 0600` → rename).
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let path = settings_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid settings path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let yaml = serde_yaml::to_string(settings).map_err(|source| ConfigError::Yaml {
        path: path.clone(),
        source,
    })?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), ConfigError> {
    save_at(&home()?, settings)
}

pub(crate) fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// The settings file may hold an API key.
#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
