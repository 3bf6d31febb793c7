//! Application configuration management.
//!
//! Settings are layered with figment: built-in defaults, then the TOML
//! config file, then `DUPEVAULT_*` environment variables. Command-line
//! flags are applied on top by the caller.

use anyhow::Result;
use directories::{ProjectDirs, UserDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::duplicates::DEFAULT_QUICK_SCAN_THRESHOLD;
use crate::session::{CoordinatorConfig, DEFAULT_PROGRESS_INTERVAL};

/// Prefix of environment variables read into [`Config`].
pub const ENV_PREFIX: &str = "DUPEVAULT_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prune files with a unique size before hashing.
    pub quick_scan: bool,
    /// Candidate count above which quick scan applies.
    pub quick_scan_threshold: usize,
    /// Hashing worker threads.
    pub hash_threads: usize,
    /// Processed files between duplicate-count refreshes.
    pub progress_interval: usize,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Include zero-byte files.
    pub include_empty: bool,
    /// Default extension filter; empty scans everything.
    pub extensions: Vec<String>,
    /// Index location. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Quarantine location. Defaults to `<documents>/dupevault-quarantine`.
    pub quarantine_dir: Option<PathBuf>,
    /// Restore location. Defaults to `<home>/dupevault-restored`.
    pub restore_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quick_scan: true,
            quick_scan_threshold: DEFAULT_QUICK_SCAN_THRESHOLD,
            hash_threads: 1,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            skip_hidden: false,
            include_empty: false,
            extensions: Vec::new(),
            database_path: None,
            quarantine_dir: None,
            restore_dir: None,
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    #[must_use]
    pub fn load() -> Self {
        Self::load_from(None)
    }

    /// Load the configuration, reading `path` instead of the default file
    /// when given. Falls back to defaults if anything is malformed.
    #[must_use]
    pub fn load_from(path: Option<&Path>) -> Self {
        match Self::figment(path).extract() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// The provider stack behind [`Config::load_from`].
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let file = path.map(Path::to_path_buf).or_else(Self::config_path);
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Save the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Fails if the file or its directory cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default platform-specific configuration file.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join("config.toml"))
    }

    /// Index location after applying defaults.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            project_dirs().map_or_else(
                || PathBuf::from("dupevault-index.sqlite3"),
                |d| d.data_dir().join("index.sqlite3"),
            )
        })
    }

    /// Quarantine location after applying defaults.
    #[must_use]
    pub fn quarantine_dir(&self) -> PathBuf {
        self.quarantine_dir.clone().unwrap_or_else(|| {
            let base = UserDirs::new().and_then(|u| {
                u.document_dir()
                    .map(Path::to_path_buf)
                    .or_else(|| Some(u.home_dir().to_path_buf()))
            });
            base.unwrap_or_default().join("dupevault-quarantine")
        })
    }

    /// Restore location after applying defaults.
    #[must_use]
    pub fn restore_dir(&self) -> PathBuf {
        self.restore_dir.clone().unwrap_or_else(|| {
            UserDirs::new()
                .map(|u| u.home_dir().to_path_buf())
                .unwrap_or_default()
                .join("dupevault-restored")
        })
    }

    /// Coordinator settings derived from this configuration. The quarantine
    /// directory is always excluded from scans.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_quick_scan_threshold(self.quick_scan_threshold)
            .with_hash_threads(self.hash_threads)
            .with_progress_interval(self.progress_interval)
            .with_skip_hidden(self.skip_hidden)
            .with_include_empty(self.include_empty)
            .with_exclude(self.quarantine_dir())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "dupevault", "dupevault")
}
