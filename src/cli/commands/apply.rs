//! apply command - Apply every scheduled change

use anyhow::{bail, Context as _, Result};

use crate::cli::Context;
use crate::ui::output::{self, format_change_set};

/// Run one apply pass. A rejected batch is an error, so the process exits
/// non-zero while the changes stay scheduled.
pub fn apply(ctx: &Context) -> Result<()> {
    let mut lock = ctx.lock()?;
    let mut engine = ctx.engine()?;
    let outcome = engine.apply_scheduled_changes()?;
    lock.release().context("Failed to unlock repository")?;

    if let Some(rejection) = outcome.rejection {
        bail!("{} All changes remain scheduled.", rejection);
    }
    if !outcome.changed {
        output::print("Nothing scheduled.", ctx.verbosity);
        return Ok(());
    }
    output::print("Applied scheduled changes:", ctx.verbosity);
    output::print(format_change_set(&outcome.changes), ctx.verbosity);
    Ok(())
}
