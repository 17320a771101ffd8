//! engine
//!
//! The scheduled-change engine: schedules installs, removals, updates and
//! feature changes into the catalog's change ledger, and applies the whole
//! ledger as one batch.
//!
//! # Architecture
//!
//! Scheduling operations ([`schedule`]) validate a request against the
//! current catalog and persist it as a ledger entry. Nothing else changes
//! until [`Engine::apply_scheduled_changes`] ([`apply`]) runs a pass:
//!
//! ```text
//! Idle -> BuildingContext -> Validating -> Committing -> Idle
//!                                 |
//!                                 +-> Aborted -> Idle
//! ```
//!
//! 1. **BuildingContext**: assemble a candidate schema context with every
//!    scheduled change applied
//! 2. **Validating**: check removals, condition dependencies and the
//!    persisted data against the candidate
//! 3. **Committing**: rewrite the catalog, schema files and module data
//!
//! # Invariants
//!
//! - A soft failure (the batch cannot be applied) leaves the catalog, the
//!   ledger and every module data file exactly as they were
//! - Dependency records are rebuilt from scratch on every commit
//! - The catalog is stored last, after schemas and data
//!
//! # Example
//!
//! ```
//! use yangmods::engine::Engine;
//! use yangmods::store::MemoryBackend;
//!
//! let mut engine = Engine::new(MemoryBackend::initialized());
//! engine
//!     .schedule_install(r#"{"name": "example"}"#, &[], None)
//!     .unwrap();
//! let outcome = engine.apply_scheduled_changes().unwrap();
//! assert!(outcome.changed && !outcome.failed);
//! assert!(engine.catalog().unwrap().find_module("example").is_some());
//! ```

pub mod apply;
mod imports;
pub mod schedule;

#[cfg(test)]
mod testutil;

pub use apply::{ApplyOutcome, ApplyPhase, ChangeSet, Rejection};

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::schema::{Atomizer, JsonSchemaParser, PathAtomizer, SchemaParser};
use crate::store::{Backend, StoreError};

/// Errors from engine operations.
///
/// Conflict variants (`AlreadyScheduled` through `InvalidRequest`) are
/// returned before anything is written.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A catalog operation failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A state that a consistent repository cannot reach.
    #[error("internal error: {0}")]
    Internal(String),

    /// The repository disagrees with its own catalog.
    #[error("repository is corrupted: {0}")]
    Corrupted(String),

    #[error("{0}")]
    AlreadyScheduled(String),

    #[error("{0}")]
    NotScheduled(String),

    /// The requested state is already the current state.
    #[error("{0}")]
    AlreadySet(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    /// The request is well-formed but cannot be scheduled.
    #[error("{0}")]
    InvalidRequest(String),
}

/// Scheduling and apply passes over one backend.
pub struct Engine<B: Backend> {
    backend: B,
    parser: Box<dyn SchemaParser>,
    atomizer: Box<dyn Atomizer>,
    /// Directories searched for imports not found in the repository.
    search_dirs: Vec<PathBuf>,
}

impl<B: Backend> Engine<B> {
    /// Engine with the JSON module parser and the path atomizer.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            parser: Box::new(JsonSchemaParser),
            atomizer: Box::new(PathAtomizer),
            search_dirs: Vec::new(),
        }
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn SchemaParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_atomizer(mut self, atomizer: Box<dyn Atomizer>) -> Self {
        self.atomizer = atomizer;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The persisted catalog. A repository that never stored one has an
    /// empty catalog.
    pub fn catalog(&self) -> Result<Catalog, EngineError> {
        Ok(self.backend.load_catalog()?.unwrap_or_default())
    }

    fn store_catalog(&mut self, catalog: &Catalog) -> Result<(), EngineError> {
        self.backend.store_catalog(catalog)?;
        Ok(())
    }
}
