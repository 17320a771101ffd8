//! core
//!
//! Core domain types, configuration and repository plumbing.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ModuleName, Revision, Datastore, etc.
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for repository storage
//! - [`lock`] - Exclusive repository lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod lock;
pub mod paths;
pub mod types;
