//! yangmods - module catalog and scheduled-change engine for YANG-based
//! datastores
//!
//! A repository holds the installed YANG modules of a datastore: their
//! sources, enabled features, the persisted instance data of each module,
//! and the dependencies between modules. Installs, removals, updates and
//! feature changes are scheduled first and applied later as one batch
//! that is checked against the data before anything is rewritten.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface of the `ymod` binary
//! - [`engine`] - Scheduling operations and the apply pass
//! - [`catalog`] - The persisted catalog, its change ledger and dependency extraction
//! - [`schema`] - Module sources, the schema context, XPath atoms and instance data
//! - [`store`] - Persistence backends (files, memory)
//! - [`core`] - Domain types, paths, configuration and locking
//! - [`ui`] - Output and logging
//!
//! # Correctness Invariants
//!
//! 1. The catalog only records modules the schema context can load
//! 2. A rejected batch changes nothing on disk
//! 3. Dependency records always match the installed module set
//! 4. Every `ymod` command that writes holds the repository lock

pub mod catalog;
pub mod cli;
pub mod core;
pub mod engine;
pub mod schema;
pub mod store;
pub mod ui;
