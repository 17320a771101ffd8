//! replay command - Toggle notification replay support

use anyhow::Result;

use crate::cli::Context;
use crate::ui::output;

/// Turn replay support on or off for `module`, or for every installed
/// module when `module` is `None`.
pub fn replay(ctx: &Context, module: Option<&str>, on: bool) -> Result<()> {
    let _lock = ctx.lock()?;
    ctx.engine()?.set_replay_support(module, on)?;
    let state = if on { "on" } else { "off" };
    let target = module.unwrap_or("all modules");
    output::print(format!("Replay support {} for {}", state, target), ctx.verbosity);
    Ok(())
}
