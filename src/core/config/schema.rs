//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$YANGMODS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/yangmods/config.toml`
//! 3. `~/.yangmods/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<repository>/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing (log filters must parse as
//! `tracing` directives, search directories must be non-empty paths).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use super::ConfigError;

fn validate_log_filter(filter: &Option<String>) -> Result<(), ConfigError> {
    if let Some(filter) = filter {
        EnvFilter::try_new(filter).map_err(|e| {
            ConfigError::InvalidValue(format!("invalid log_filter '{}': {}", filter, e))
        })?;
    }
    Ok(())
}

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// repository = "/var/lib/yangmods"
/// log_filter = "yangmods=debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default repository directory when `--repo` is not given
    pub repository: Option<PathBuf>,

    /// Default `tracing` filter directives
    pub log_filter: Option<String>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(repo) = &self.repository {
            if repo.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "repository cannot be empty".to_string(),
                ));
            }
        }
        validate_log_filter(&self.log_filter)
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// search_dirs = ["/usr/share/yang/modules"]
/// log_filter = "info"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Directories searched for imported module sources not yet in the repository
    pub search_dirs: Vec<PathBuf>,

    /// Repository-specific `tracing` filter directives
    pub log_filter: Option<String>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_dirs.iter().any(|d| d.as_os_str().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "search_dirs entries cannot be empty".to_string(),
            ));
        }
        validate_log_filter(&self.log_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod global_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = GlobalConfig::default();
            assert!(config.repository.is_none());
            assert!(config.log_filter.is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn valid_filter() {
            let config = GlobalConfig {
                log_filter: Some("yangmods=debug,warn".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_ok());
        }

        #[test]
        fn invalid_filter() {
            let config = GlobalConfig {
                log_filter: Some("yangmods=notalevel".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn empty_repository_rejected() {
            let config = GlobalConfig {
                repository: Some(PathBuf::new()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn roundtrip() {
            let config = GlobalConfig {
                repository: Some(PathBuf::from("/srv/yang")),
                log_filter: Some("info".to_string()),
            };
            let toml = toml::to_string_pretty(&config).unwrap();
            let parsed: GlobalConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config, parsed);
        }
    }

    mod repo_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = RepoConfig::default();
            assert!(config.search_dirs.is_empty());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn empty_search_dir_rejected() {
            let config = RepoConfig {
                search_dirs: vec![PathBuf::from("/ok"), PathBuf::new()],
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn roundtrip() {
            let config = RepoConfig {
                search_dirs: vec![PathBuf::from("/usr/share/yang")],
                log_filter: Some("debug".to_string()),
            };
            let toml = toml::to_string_pretty(&config).unwrap();
            let parsed: RepoConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config, parsed);
        }

        #[test]
        fn reject_unknown_fields() {
            let toml = r#"
                search_dirs = []
                trunk = "main"
            "#;
            let result: Result<RepoConfig, _> = toml::from_str(toml);
            assert!(result.is_err());
        }
    }
}
