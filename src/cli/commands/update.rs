//! update and cancel-update commands

use std::path::Path;

use anyhow::Result;

use super::read_input;
use crate::cli::Context;
use crate::ui::output;

/// Schedule an update to the revision in `file`.
pub fn update(ctx: &Context, file: &Path) -> Result<()> {
    let text = read_input(file)?;
    let _lock = ctx.lock()?;
    let name = ctx.engine()?.schedule_update(&text)?;
    output::print(format!("Scheduled update of {}", name), ctx.verbosity);
    Ok(())
}

pub fn cancel_update(ctx: &Context, module: &str) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.engine()?.unschedule_update(module)?;
    output::print(format!("Cancelled update of {}", module), ctx.verbosity);
    Ok(())
}
