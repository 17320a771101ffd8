//! install and cancel-install commands

use std::path::Path;

use anyhow::{Context as _, Result};
use serde_json::Value;

use super::read_input;
use crate::cli::Context;
use crate::core::types::FeatureName;
use crate::ui::output;

/// Schedule the module in `file` for installation.
///
/// # Arguments
///
/// * `features` - Features to enable on install
/// * `data` - JSON file with data stored into both datastores on apply
pub fn install(ctx: &Context, file: &Path, features: &[String], data: Option<&Path>) -> Result<()> {
    let text = read_input(file)?;
    let features = features
        .iter()
        .map(|f| FeatureName::new(f.as_str()).with_context(|| format!("Invalid feature name '{}'", f)))
        .collect::<Result<Vec<_>>>()?;
    let data: Option<Value> = match data {
        Some(path) => Some(
            serde_json::from_str(&read_input(path)?)
                .with_context(|| format!("{} is not valid JSON", path.display()))?,
        ),
        None => None,
    };

    let _lock = ctx.lock()?;
    let mut engine = ctx.engine()?;
    let name = engine.schedule_install(&text, &features, data.as_ref())?;
    output::print(format!("Scheduled installation of {}", name), ctx.verbosity);
    Ok(())
}

pub fn cancel_install(ctx: &Context, module: &str) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.engine()?.unschedule_install(module)?;
    output::print(format!("Cancelled installation of {}", module), ctx.verbosity);
    Ok(())
}
