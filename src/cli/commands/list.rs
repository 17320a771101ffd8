//! list and show commands - Read-only views of the catalog

use anyhow::{anyhow, Result};

use crate::catalog::{Dependency, DependencySet};
use crate::cli::Context;
use crate::ui::output::{self, format_list, format_module, format_scheduled};

/// List installed modules, then the scheduled changes.
pub fn list(ctx: &Context) -> Result<()> {
    let catalog = ctx.engine()?.catalog()?;

    if catalog.modules.is_empty() {
        output::print("No modules installed.", ctx.verbosity);
    }
    for entry in &catalog.modules {
        let mut line = format_module(entry);
        if !entry.enabled_features.is_empty() {
            let features: Vec<&str> = entry.enabled_features.iter().map(|f| f.as_str()).collect();
            line.push_str(&format!(" [{}]", features.join(", ")));
        }
        println!("{}", line);
    }

    let scheduled = catalog.scheduled_changes();
    if !scheduled.is_empty() {
        println!("scheduled:");
        println!("{}", format_scheduled(&scheduled));
    }
    Ok(())
}

/// Show the full catalog record of one installed module.
pub fn show(ctx: &Context, module: &str) -> Result<()> {
    let catalog = ctx.engine()?.catalog()?;
    let entry = catalog
        .find_module(module)
        .ok_or_else(|| anyhow!("Module \"{}\" is not installed.", module))?;

    println!("Module: {}", entry.name);
    println!("Revision: {}", entry.revision_label());
    if !entry.enabled_features.is_empty() {
        println!("Features:");
        println!("{}", format_list(&entry.enabled_features, "  "));
    }
    if let Some(since) = &entry.replay_support {
        println!("Replay support: since {}", since);
    }
    if !entry.data_deps.is_empty() {
        println!("Data dependencies:");
        println!("{}", format_deps(&entry.data_deps));
    }
    for op in &entry.op_deps {
        println!("Operation {}:", op.path);
        if !op.input.is_empty() {
            println!("  in:");
            println!("{}", indent(&format_deps(&op.input)));
        }
        if let Some(out) = op.output.as_ref().filter(|o| !o.is_empty()) {
            println!("  out:");
            println!("{}", indent(&format_deps(out)));
        }
    }
    if !entry.inverse_deps.is_empty() {
        println!("Required by:");
        println!("{}", format_list(&entry.inverse_deps, "  "));
    }

    let pending: Vec<_> = catalog
        .scheduled_changes()
        .into_iter()
        .filter(|(name, _)| name.as_str() == module)
        .collect();
    if !pending.is_empty() {
        println!("Scheduled:");
        println!("{}", format_scheduled(&pending));
    }
    Ok(())
}

fn format_deps(deps: &DependencySet) -> String {
    let lines: Vec<String> = deps
        .iter()
        .map(|d| match d {
            Dependency::ModuleRef { module } => format!("module {}", module),
            Dependency::InstanceId {
                xpath,
                default_module: Some(m),
            } => format!("instance-identifier {} (default in {})", xpath, m),
            Dependency::InstanceId { xpath, .. } => format!("instance-identifier {}", xpath),
        })
        .collect();
    format_list(&lines, "  ")
}

fn indent(block: &str) -> String {
    format_list(&block.lines().collect::<Vec<_>>(), "  ")
}
