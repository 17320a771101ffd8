//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! There are two configuration scopes:
//! - **Global**: User-level settings (default repository, log filter)
//! - **Repo**: Settings stored inside a module repository
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$YANGMODS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/yangmods/config.toml`
//! 3. `~/.yangmods/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use yangmods::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/srv/yang"))).unwrap();
//! for dir in config.search_dirs() {
//!     println!("search: {}", dir.display());
//! }
//! ```

pub mod schema;

pub use schema::{GlobalConfig, RepoConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Environment variable naming an explicit global config file.
pub const CONFIG_ENV: &str = "YANGMODS_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules; repo config overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `repo_root` is provided, also loads `<repo_root>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// fail validation. Missing files are not an error.
    pub fn load(repo_root: Option<&Path>) -> Result<Config, ConfigError> {
        let (global, global_path) = Self::load_global()?;
        global.validate()?;

        let repo = match repo_root {
            Some(root) => Self::load_repo(root)?,
            None => None,
        };
        if let Some(r) = &repo {
            r.validate()?;
        }

        Ok(Config {
            global,
            repo,
            global_path,
        })
    }

    fn load_global() -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok((Self::read_toml(&path)?, Some(path)));
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("yangmods/config.toml");
            if path.exists() {
                return Ok((Self::read_toml(&path)?, Some(path)));
            }
        }

        if let Ok(path) = Self::global_config_path() {
            if path.exists() {
                return Ok((Self::read_toml(&path)?, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    /// Load the configuration stored in a repository, if any.
    pub fn load_repo(repo_root: &Path) -> Result<Option<RepoConfig>, ConfigError> {
        let path = RepoPaths::new(repo_root.to_path_buf()).repo_config_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_toml(&path)?))
    }

    fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for global config, `~/.yangmods/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".yangmods/config.toml"))
    }

    /// Write repo config atomically.
    pub fn write_repo(paths: &RepoPaths, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = paths.repo_config_path();
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file atomically (temp file in the same directory, then rename).
    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;
        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Default repository directory from global config.
    pub fn repository(&self) -> Option<&Path> {
        self.global.repository.as_deref()
    }

    /// Effective log filter: repo overrides global.
    pub fn log_filter(&self) -> Option<&str> {
        self.repo
            .as_ref()
            .and_then(|r| r.log_filter.as_deref())
            .or(self.global.log_filter.as_deref())
    }

    /// Import search directories. Empty if not configured.
    pub fn search_dirs(&self) -> &[PathBuf] {
        self.repo
            .as_ref()
            .map(|r| r.search_dirs.as_slice())
            .unwrap_or(&[])
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn global_path_is_under_home() {
        if let Some(home) = dirs::home_dir() {
            let path = Config::global_config_path().unwrap();
            assert_eq!(path, home.join(".yangmods").join("config.toml"));
        }
    }

    #[test]
    fn missing_repo_config_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(Config::load_repo(temp.path()).unwrap().is_none());
    }

    #[test]
    fn load_repo_config() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("config.toml"),
            r#"
            search_dirs = ["/usr/share/yang"]
            log_filter = "debug"
            "#,
        )
        .unwrap();

        let repo = Config::load_repo(temp.path()).unwrap().unwrap();
        assert_eq!(repo.search_dirs, vec![PathBuf::from("/usr/share/yang")]);
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.toml"), "unknown_field = true").unwrap();
        assert!(Config::load_repo(temp.path()).is_err());
    }

    #[test]
    fn write_repo_config_atomic() {
        let temp = TempDir::new().unwrap();
        let paths = RepoPaths::new(temp.path().to_path_buf());
        let config = RepoConfig {
            search_dirs: vec![PathBuf::from("/opt/yang")],
            log_filter: None,
        };

        let path = Config::write_repo(&paths, &config).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = Config::load_repo(temp.path()).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn repo_filter_overrides_global() {
        let config = Config {
            global: GlobalConfig {
                log_filter: Some("warn".to_string()),
                ..Default::default()
            },
            repo: Some(RepoConfig {
                log_filter: Some("debug".to_string()),
                ..Default::default()
            }),
            global_path: None,
        };
        assert_eq!(config.log_filter(), Some("debug"));
    }

    #[test]
    fn global_filter_used_without_repo() {
        let config = Config {
            global: GlobalConfig {
                log_filter: Some("warn".to_string()),
                ..Default::default()
            },
            repo: None,
            global_path: None,
        };
        assert_eq!(config.log_filter(), Some("warn"));
        assert!(config.search_dirs().is_empty());
    }
}
