//! core::paths
//!
//! Centralized path routing for repository storage locations.
//!
//! # Architecture
//!
//! Every on-disk location used by the file backend, the lock and the
//! configuration loader is computed here. No other module joins file
//! names onto the repository root.
//!
//! # Storage Layout
//!
//! All data lives under the repository root:
//! - `catalog.json` - Module catalog and change ledger
//! - `config.toml` - Repository configuration
//! - `lock` - Exclusive lock file
//! - `data/<module>.<datastore>.json` - Persisted instance data
//! - `schemas/<module>[@<revision>].json` - Stored module sources
//!
//! # Example
//!
//! ```
//! use yangmods::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/srv/yang"));
//! assert_eq!(paths.catalog_path(), PathBuf::from("/srv/yang/catalog.json"));
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{Datastore, ModuleName, Revision};

/// Centralized path routing for a module repository.
///
/// # Invariants
///
/// - All paths are children of `root`
/// - File names derive only from validated [`ModuleName`] and [`Revision`]
///   values, so they never contain path separators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// Repository root directory.
    pub root: PathBuf,
}

impl RepoPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the persisted catalog, `<root>/catalog.json`.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.json")
    }

    /// Path to the repository configuration, `<root>/config.toml`.
    pub fn repo_config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the repository lock file, `<root>/lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// Directory holding instance data files.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Path to one module's data in one datastore.
    ///
    /// # Example
    ///
    /// ```
    /// use yangmods::core::paths::RepoPaths;
    /// use yangmods::core::types::{Datastore, ModuleName};
    /// use std::path::PathBuf;
    ///
    /// let paths = RepoPaths::new(PathBuf::from("/r"));
    /// let m = ModuleName::new("ifaces").unwrap();
    /// assert_eq!(
    ///     paths.data_path(&m, Datastore::Running),
    ///     PathBuf::from("/r/data/ifaces.running.json")
    /// );
    /// ```
    pub fn data_path(&self, module: &ModuleName, ds: Datastore) -> PathBuf {
        self.data_dir()
            .join(format!("{}.{}.json", module.as_str(), ds.as_str()))
    }

    /// Directory holding stored module sources.
    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join("schemas")
    }

    /// Path to a stored module source.
    ///
    /// Revisionless modules are stored as `<module>.json`.
    pub fn schema_path(&self, module: &ModuleName, revision: Option<&Revision>) -> PathBuf {
        let file = match revision {
            Some(rev) => format!("{}@{}.json", module.as_str(), rev.as_str()),
            None => format!("{}.json", module.as_str()),
        };
        self.schemas_dir().join(file)
    }
}
