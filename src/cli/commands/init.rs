//! init command - Create an empty module repository

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::config::{Config, RepoConfig};
use crate::store::FileBackend;
use crate::ui::output;

/// Create the repository layout, an empty catalog and a default
/// repository configuration. An existing repository is left untouched.
pub fn init(ctx: &Context) -> Result<()> {
    let _lock = ctx.lock()?;
    let mut backend = FileBackend::new(ctx.paths.clone());
    let created = backend
        .init()
        .with_context(|| format!("Failed to initialize {}", ctx.repo().display()))?;

    if !created {
        output::print(
            format!("Repository already initialized at {}", ctx.repo().display()),
            ctx.verbosity,
        );
        return Ok(());
    }

    if !ctx.paths.repo_config_path().exists() {
        Config::write_repo(&ctx.paths, &RepoConfig::default())
            .context("Failed to write repository configuration")?;
    }
    output::print(
        format!("Initialized module repository at {}", ctx.repo().display()),
        ctx.verbosity,
    );
    Ok(())
}
