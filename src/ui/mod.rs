//! ui
//!
//! User-facing output of the `ymod` binary.
//!
//! # Modules
//!
//! - [`output`] - Command output and verbosity handling
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Design
//!
//! Command results go to stdout through [`output`]; diagnostics from the
//! engine go to stderr through the subscriber set up by [`logging`].

pub mod logging;
pub mod output;
