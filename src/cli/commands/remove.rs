//! remove and cancel-remove commands

use anyhow::Result;

use crate::cli::Context;
use crate::ui::output;

pub fn remove(ctx: &Context, module: &str) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.engine()?.schedule_remove(module)?;
    output::print(format!("Scheduled removal of {}", module), ctx.verbosity);
    Ok(())
}

/// Cancel a scheduled removal. Removals of the module's imports that
/// were scheduled are cancelled as well.
pub fn cancel_remove(ctx: &Context, module: &str) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.engine()?.unschedule_remove(module)?;
    output::print(format!("Cancelled removal of {}", module), ctx.verbosity);
    Ok(())
}
