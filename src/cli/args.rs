//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--repo <path>`: Module repository to operate on
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// ymod - manage the installed YANG modules of a datastore
#[derive(Parser, Debug)]
#[command(name = "ymod")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Module repository directory (defaults to the configured repository,
    /// then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Target of a `replay` command.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ReplayTarget {
    /// Module to change
    pub module: Option<String>,

    /// Every installed module
    #[arg(long)]
    pub all: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty module repository
    #[command(
        name = "init",
        long_about = "Create an empty module repository.\n\n\
            Creates the catalog, the schema and data directories, and an empty \
            repository configuration. Running init on an existing repository \
            leaves it untouched.",
        after_help = "\
EXAMPLES:
    ymod --repo /srv/yang init"
    )]
    Init,

    /// List installed modules and scheduled changes
    #[command(
        name = "list",
        long_about = "List installed modules and every scheduled change.\n\n\
            Installed modules are shown as name@revision with their enabled \
            features. Scheduled changes are listed below until the next apply.",
        after_help = "\
READING THE OUTPUT:
    base@2024-01-01 [extra]     <- installed, feature extra enabled
    scheduled:
      user: install             <- waits for the next apply"
    )]
    List,

    /// Show the catalog record of one module
    #[command(
        name = "show",
        long_about = "Show the catalog record of one installed module.\n\n\
            Prints revision, enabled features, replay support, dependency \
            records, dependent modules and pending changes."
    )]
    Show {
        /// Module name
        module: String,
    },

    /// Schedule a module for installation
    #[command(
        name = "install",
        long_about = "Schedule a module for installation.\n\n\
            The module source is checked against the current catalog right away; \
            nothing is installed until the next apply. Imports are resolved from \
            the repository and the configured search directories.",
        after_help = "\
EXAMPLES:
    # Install with a feature enabled
    ymod install acme.json --feature fast-path

    # Install with initial data for both datastores
    ymod install acme.json --data acme-data.json"
    )]
    Install {
        /// Module source file
        file: PathBuf,

        /// Feature to enable (repeatable)
        #[arg(long = "feature", value_name = "FEATURE")]
        features: Vec<String>,

        /// Initial data stored into both datastores on apply
        #[arg(long, value_name = "FILE")]
        data: Option<PathBuf>,
    },

    /// Cancel a scheduled installation
    #[command(name = "cancel-install")]
    CancelInstall {
        /// Module name
        module: String,
    },

    /// Schedule an installed module for removal
    #[command(
        name = "remove",
        long_about = "Schedule an installed module for removal.\n\n\
            The apply pass rejects the removal while another module still \
            references the module's data."
    )]
    Remove {
        /// Module name
        module: String,
    },

    /// Cancel a scheduled removal
    #[command(name = "cancel-remove")]
    CancelRemove {
        /// Module name
        module: String,
    },

    /// Schedule an update to a newer revision
    #[command(
        name = "update",
        long_about = "Schedule an update of an installed module.\n\n\
            The source must carry a revision newer than the installed one."
    )]
    Update {
        /// Module source file
        file: PathBuf,
    },

    /// Cancel a scheduled update
    #[command(name = "cancel-update")]
    CancelUpdate {
        /// Module name
        module: String,
    },

    /// Schedule enabling or disabling a feature
    #[command(
        name = "feature",
        long_about = "Schedule enabling or disabling a feature of an installed module.\n\n\
            Scheduling the opposite of a pending change cancels it.",
        after_help = "\
EXAMPLES:
    ymod feature base extra --enable
    ymod feature base extra --disable"
    )]
    Feature {
        /// Module name
        module: String,

        /// Feature name
        feature: String,

        /// Enable the feature
        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,

        /// Disable the feature
        #[arg(long)]
        disable: bool,
    },

    /// Turn notification replay support on or off
    #[command(
        name = "replay",
        long_about = "Turn notification replay support on or off.\n\n\
            Takes effect immediately; this change is not scheduled.",
        after_help = "\
EXAMPLES:
    ymod replay base --on
    ymod replay --all --off"
    )]
    Replay {
        #[command(flatten)]
        target: ReplayTarget,

        /// Enable replay support
        #[arg(long, conflicts_with = "off", required_unless_present = "off")]
        on: bool,

        /// Disable replay support
        #[arg(long)]
        off: bool,
    },

    /// Apply every scheduled change as one batch
    #[command(
        name = "apply",
        long_about = "Apply every scheduled change as one batch.\n\n\
            The batch is validated against a candidate schema context and the \
            stored data first. If any check fails, nothing changes, every change \
            stays scheduled, and the command exits with a non-zero status."
    )]
    Apply,
}
