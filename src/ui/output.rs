//! ui::output
//!
//! Command output.
//!
//! # Design
//!
//! Results go to stdout and respect `--quiet`. Errors and debug detail go
//! to stderr. Formatting helpers return strings so commands can be tested
//! without capturing the terminal.

use std::fmt::Display;

use crate::catalog::{ModuleEntry, ScheduledChange};
use crate::core::types::ModuleName;
use crate::engine::ChangeSet;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only errors and requested data
    Quiet,
    Normal,
    /// Extra detail on stderr
    Debug,
}

impl Verbosity {
    /// `--quiet` wins over `--debug`.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print a debug message (only in debug mode).
pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Format a list of items, one per line.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `name@revision`, or the bare name for an undated module.
pub fn format_module(entry: &ModuleEntry) -> String {
    match &entry.revision {
        Some(rev) => format!("{}@{}", entry.name, rev),
        None => entry.name.to_string(),
    }
}

/// One line per scheduled change: `<module>: <change>`.
pub fn format_scheduled(changes: &[(&ModuleName, ScheduledChange<'_>)]) -> String {
    let lines: Vec<String> = changes
        .iter()
        .map(|(name, change)| format!("{}: {}", name, change.describe()))
        .collect();
    format_list(&lines, "  ")
}

/// Summary of a committed batch.
pub fn format_change_set(changes: &ChangeSet) -> String {
    if changes.is_empty() {
        return "No changes.".to_string();
    }
    let mut lines = Vec::new();
    for (label, names) in [
        ("installed", &changes.installed),
        ("updated", &changes.updated),
        ("removed", &changes.removed),
    ] {
        for name in names {
            lines.push(format!("{} {}", label, name));
        }
    }
    for (name, change) in &changes.features {
        let verb = if change.enable { "enabled" } else { "disabled" };
        lines.push(format!("{} feature {} of {}", verb, change.feature, name));
    }
    format_list(&lines, "  ")
}
