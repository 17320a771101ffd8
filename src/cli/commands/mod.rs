//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Reads and validates command-specific input (files, names)
//! 2. Calls the engine, holding the repository lock if it writes
//! 3. Formats and displays output
//!
//! Handlers do NOT edit the catalog directly.

mod apply;
mod feature;
mod init;
mod install;
mod list;
mod remove;
mod replay;
mod update;

pub use apply::apply;
pub use feature::feature;
pub use init::init;
pub use install::{cancel_install, install};
pub use list::{list, show};
pub use remove::{cancel_remove, remove};
pub use replay::replay;
pub use update::{cancel_update, update};

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};

use super::args::Command;
use super::Context;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init => init(ctx),
        Command::List => list(ctx),
        Command::Show { module } => show(ctx, &module),
        Command::Install {
            file,
            features,
            data,
        } => install(ctx, &file, &features, data.as_deref()),
        Command::CancelInstall { module } => cancel_install(ctx, &module),
        Command::Remove { module } => remove(ctx, &module),
        Command::CancelRemove { module } => cancel_remove(ctx, &module),
        Command::Update { file } => update(ctx, &file),
        Command::CancelUpdate { module } => cancel_update(ctx, &module),
        Command::Feature {
            module,
            feature: name,
            enable,
            ..
        } => feature(ctx, &module, &name, enable),
        Command::Replay { target, on, .. } => replay(ctx, target.module.as_deref(), on),
        Command::Apply => apply(ctx),
    }
}

/// Read a module source or data file.
fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
