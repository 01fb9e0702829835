//! Configuration loading and management
//!
//! Handles parsing of `.taskgraph.toml` configuration files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archive::{ArchiveMatcher, DEFAULT_ARCHIVE_DIR};
use crate::error::{Error, Result};
use crate::fs::compile_patterns;
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Config file name at the repository root
pub const CONFIG_FILE_NAME: &str = ".taskgraph.toml";

const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Task discovery
    #[serde(default)]
    pub tasks: TasksConfig,

    /// On-disk index cache
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where task files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Root directory scanned for task files
    #[serde(default = "default_tasks_root")]
    pub root: PathBuf,

    /// Archive directory; tasks below it count as completed
    #[serde(default = "default_archive_dir")]
    pub archive: PathBuf,

    /// Glob patterns, relative to each scanned root
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

fn default_tasks_root() -> PathBuf {
    PathBuf::from("tasks")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARCHIVE_DIR)
}

fn default_patterns() -> Vec<String> {
    vec!["**/*.yaml".to_string(), "**/*.yml".to_string()]
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            root: default_tasks_root(),
            archive: default_archive_dir(),
            patterns: default_patterns(),
        }
    }
}

/// Index cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Index file, relative to the repo root
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// How long to wait for the index lock before going uncached
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".taskgraph/index.json")
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.taskgraph.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from repo root, or return defaults
    pub fn load_from_repo(repo_root: &Path) -> Self {
        let config_path = repo_root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Matcher for the configured archive directory
    pub fn archive_matcher(&self) -> ArchiveMatcher {
        ArchiveMatcher::new(&self.tasks.archive)
    }

    pub fn validate(&self) -> Result<()> {
        self.tasks.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl TasksConfig {
    fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.root cannot be empty".to_string(),
            ));
        }
        if self.archive.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.archive cannot be empty".to_string(),
            ));
        }
        if self.patterns.is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.patterns cannot be empty".to_string(),
            ));
        }
        compile_patterns(&self.patterns)?;
        Ok(())
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "cache.path cannot be empty".to_string(),
            ));
        }
        if self.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(Error::InvalidConfig(format!(
                "cache.lock_timeout_ms must be <= {MAX_LOCK_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.tasks.root, PathBuf::from("tasks"));
        assert_eq!(cfg.tasks.archive, PathBuf::from("tasks/archive"));
        assert_eq!(
            cfg.tasks.patterns,
            vec!["**/*.yaml".to_string(), "**/*.yml".to_string()]
        );
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.path, PathBuf::from(".taskgraph/index.json"));
        assert_eq!(cfg.cache.lock_timeout_ms, 2000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        let content = r#"
[tasks]
root = "backlog"
archive = "backlog/done"

[cache]
enabled = false
lock_timeout_ms = 250
"#;
        fs::write(&path, content).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.tasks.root, PathBuf::from("backlog"));
        assert_eq!(cfg.tasks.archive, PathBuf::from("backlog/done"));
        assert_eq!(cfg.tasks.patterns, default_patterns());
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.path, default_cache_path());
        assert_eq!(cfg.cache.lock_timeout_ms, 250);
        assert!(cfg.archive_matcher().is_archived("backlog/done/T-1.yaml"));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&path, "[tasks]\npatterns = [\"[\"]\n").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));

        fs::write(&path, "[cache]\nlock_timeout_ms = 600000\n").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));

        fs::write(&path, "[tasks]\nroot = \"\"\n").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));

        fs::write(&path, "[tasks\n").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_repo_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(Config::load_from_repo(dir.path()), Config::default());

        fs::write(dir.path().join(CONFIG_FILE_NAME), "not = [valid").expect("write config");
        assert_eq!(Config::load_from_repo(dir.path()), Config::default());
    }
}
