//! feature command - Schedule a feature change

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::types::FeatureName;
use crate::ui::output;

/// Schedule enabling (`enable = true`) or disabling a feature.
pub fn feature(ctx: &Context, module: &str, feature: &str, enable: bool) -> Result<()> {
    let name = FeatureName::new(feature).with_context(|| format!("Invalid feature name '{}'", feature))?;
    let _lock = ctx.lock()?;
    ctx.engine()?.schedule_feature_change(module, &name, enable)?;
    let verb = if enable { "enabling" } else { "disabling" };
    output::print(
        format!("Scheduled {} feature {} of {}", verb, name, module),
        ctx.verbosity,
    );
    Ok(())
}
