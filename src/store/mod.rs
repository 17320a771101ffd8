//! store
//!
//! Persistence seams consumed by the engine.
//!
//! # Traits
//!
//! - [`CatalogStore`] - Load and store the catalog document
//! - [`ModuleDataStore`] - Per-module instance data, one file per datastore
//! - [`SchemaRepository`] - Module source texts by name and revision
//!
//! [`Backend`] bundles all three. Two implementations ship with the crate:
//! [`FileBackend`] (JSON files under a repository directory) and
//! [`MemoryBackend`] (in-process maps, for tests and embedding).
//!
//! # Invariants
//!
//! - `store_catalog` validates before writing and never leaves a partially
//!   written catalog visible to readers
//! - `write_module_data` replaces a module's data for one datastore as a
//!   whole

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::core::types::{Datastore, ModuleName, Revision};

/// Errors from persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but cannot be parsed.
    #[error("corrupted file {path}: {message}")]
    Corrupted { path: PathBuf, message: String },

    /// The catalog failed validation before being stored.
    #[error("refusing to store invalid catalog: {0}")]
    InvalidCatalog(#[from] CatalogError),

    /// Data write without `create_if_missing` for a module with no data.
    #[error("module '{module}' has no {datastore} data")]
    MissingData {
        module: ModuleName,
        datastore: Datastore,
    },
}

/// Load and store the catalog.
pub trait CatalogStore {
    /// The persisted catalog, or `None` if none was ever stored.
    fn load_catalog(&self) -> Result<Option<Catalog>, StoreError>;

    /// Validate and persist the catalog.
    fn store_catalog(&mut self, catalog: &Catalog) -> Result<(), StoreError>;
}

/// Per-module instance data.
pub trait ModuleDataStore {
    fn read_module_data(&self, module: &ModuleName, datastore: Datastore) -> Result<Option<Value>, StoreError>;

    fn write_module_data(
        &mut self,
        module: &ModuleName,
        datastore: Datastore,
        data: &Value,
        create_if_missing: bool,
    ) -> Result<(), StoreError>;

    /// Remove the module's data in every datastore. Missing data is fine.
    fn remove_module_data(&mut self, module: &ModuleName) -> Result<(), StoreError>;
}

/// Module source texts.
pub trait SchemaRepository {
    fn store_schema(&mut self, module: &ModuleName, revision: Option<&Revision>, text: &str) -> Result<(), StoreError>;

    /// Source of a module at exactly `revision`. `None` is the undated
    /// source, never a dated one.
    fn find_schema(&self, module: &ModuleName, revision: Option<&Revision>) -> Result<Option<String>, StoreError>;

    /// Newest stored source of a module, dated or not. A dated source is
    /// newer than the undated one.
    fn find_newest_schema(&self, module: &ModuleName) -> Result<Option<String>, StoreError>;

    /// Remove a stored source. Missing sources are fine.
    fn remove_schema(&mut self, module: &ModuleName, revision: Option<&Revision>) -> Result<(), StoreError>;
}

/// Everything the engine persists through.
pub trait Backend: CatalogStore + ModuleDataStore + SchemaRepository {}

impl<T: CatalogStore + ModuleDataStore + SchemaRepository> Backend for T {}
