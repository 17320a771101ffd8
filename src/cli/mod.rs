//! cli
//!
//! Command-line interface layer of `ymod`.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers open an [`crate::engine::Engine`] over
//! the file backend and call its scheduling and apply operations; the
//! catalog is never edited here. Every handler that writes to the
//! repository holds the [`RepoLock`] for its whole run.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};

use crate::core::config::Config;
use crate::core::lock::RepoLock;
use crate::core::paths::RepoPaths;
use crate::engine::Engine;
use crate::store::FileBackend;
use crate::ui::logging::init_logging;
use crate::ui::output::{self, Verbosity};

/// Everything a handler needs to know about this run.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: RepoPaths,
    pub verbosity: Verbosity,
    /// Import search directories, relative entries resolved against the
    /// repository root.
    pub search_dirs: Vec<PathBuf>,
}

impl Context {
    /// Build the context for a repository with its loaded configuration.
    pub fn new(repo: PathBuf, config: &Config, verbosity: Verbosity) -> Self {
        let search_dirs = config
            .search_dirs()
            .iter()
            .map(|d| if d.is_absolute() { d.clone() } else { repo.join(d) })
            .collect();
        Self {
            paths: RepoPaths::new(repo),
            verbosity,
            search_dirs,
        }
    }

    pub fn repo(&self) -> &Path {
        self.paths.root()
    }

    /// Open the engine over an initialized repository.
    ///
    /// # Errors
    ///
    /// Fails if `ymod init` was never run for this repository.
    pub fn engine(&self) -> Result<Engine<FileBackend>> {
        let backend = FileBackend::new(self.paths.clone());
        if !backend.is_initialized() {
            bail!(
                "{} is not a module repository (run `ymod init` first)",
                self.repo().display()
            );
        }
        Ok(Engine::new(backend).with_search_dirs(self.search_dirs.clone()))
    }

    /// Take the repository lock.
    pub fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(&self.paths)
            .with_context(|| format!("Failed to lock repository {}", self.repo().display()))
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    let (repo, config) = resolve_repo(cli.repo.clone())?;
    init_logging(config.log_filter(), verbosity);

    let ctx = Context::new(repo, &config, verbosity);
    output::debug(format!("repository: {}", ctx.repo().display()), verbosity);
    if let Some(path) = config.global_config_loaded_from() {
        output::debug(format!("global config: {}", path.display()), verbosity);
    }
    commands::dispatch(cli.command, &ctx)
}

/// Repository root: `--repo`, then the configured repository, then the
/// current directory. Returns the configuration loaded for that root.
fn resolve_repo(flag: Option<PathBuf>) -> Result<(PathBuf, Config)> {
    if let Some(repo) = flag {
        let config = Config::load(Some(&repo)).context("Failed to load configuration")?;
        return Ok((repo, config));
    }
    let global = Config::load(None).context("Failed to load configuration")?;
    let repo = match global.repository() {
        Some(r) => r.to_path_buf(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let config = Config::load(Some(&repo)).context("Failed to load configuration")?;
    Ok((repo, config))
}
