//! schema
//!
//! Compiled schema contexts, module sources, XPath atomization and
//! instance data.
//!
//! # Modules
//!
//! - [`source`] - JSON module source documents and the [`SchemaParser`] seam
//! - [`tree`] - The [`SchemaContext`] arena of loaded modules and nodes
//! - [`xpath`] - Location-path atomization behind the [`Atomizer`] seam
//! - [`data`] - RFC 7951 instance data parsing and validation
//!
//! # Architecture
//!
//! A `SchemaContext` is built by loading module source text, enabling
//! features, and calling [`SchemaContext::finalize`]. The engine builds a
//! fresh context for every apply pass and drops it afterwards; nothing in
//! this module touches persistent storage.

pub mod data;
pub mod source;
pub mod tree;
pub mod xpath;

pub use data::{DataError, DataTree, ParseMode};
pub use source::{JsonSchemaParser, ModuleSource, NodeKind, SchemaParser};
pub use tree::{ImportResolver, LeafType, ModuleId, NodeId, SchemaContext, SchemaNode};
pub use xpath::{AtomizeOptions, Atomizer, PathAtomizer};

use thiserror::Error;

use crate::core::types::{FeatureName, ModuleName};

/// Errors from loading or compiling schema modules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Module source text is not a valid source document.
    #[error("failed to parse module source: {0}")]
    Parse(String),

    /// Module source is well-formed but semantically invalid.
    #[error("invalid module '{module}': {message}")]
    InvalidModule { module: ModuleName, message: String },

    /// An imported module could not be found.
    #[error("module '{module}' imports '{import}', which was not found")]
    ImportNotFound { module: ModuleName, import: ModuleName },

    /// Modules import each other in a cycle.
    #[error("import cycle through module '{0}'")]
    ImportCycle(ModuleName),

    /// A module is already loaded in a different revision.
    #[error("module '{module}' is loaded in revision {loaded}, cannot load {requested}")]
    RevisionConflict {
        module: ModuleName,
        loaded: String,
        requested: String,
    },

    /// The import resolver failed.
    #[error("failed to look up module '{module}': {message}")]
    Resolver { module: ModuleName, message: String },

    /// A module name is not loaded in this context.
    #[error("module '{0}' is not loaded")]
    UnknownModule(String),

    /// A feature is not defined by the module.
    #[error("module '{module}' has no feature '{feature}'")]
    UnknownFeature {
        module: ModuleName,
        feature: FeatureName,
    },

    /// A path prefix names neither the module nor one of its imports.
    #[error("prefix '{prefix}' is not imported by module '{module}'")]
    InvalidPrefix { module: ModuleName, prefix: String },

    /// An augment target or leafref path does not resolve.
    #[error("module '{module}': path '{path}' does not resolve: {message}")]
    UnresolvedPath {
        module: ModuleName,
        path: String,
        message: String,
    },

    /// An XPath expression could not be tokenized or walked.
    #[error("invalid expression '{expr}': {message}")]
    XPath { expr: String, message: String },
}
