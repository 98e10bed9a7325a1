//! Clean command - remove installed files

use super::Invocation;
use crate::cli::args::CleanArgs;
use crate::error::ArtResult;
use crate::install::Removal;
use crate::ui::{self, UiContext};
use crate::workflow;

/// Execute the clean command
pub fn execute(args: CleanArgs, invocation: &Invocation) -> ArtResult<()> {
    let ctx = invocation.context(UiContext::detect());
    let outcomes = workflow::clean(&ctx, args.dry_run)?;

    let removed = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome != Removal::Skipped)
        .count();
    let verb = if args.dry_run { "Would remove" } else { "Removed" };
    ui::outro_success(&ctx.ui, &format!("{} {} path(s)", verb, removed));
    Ok(())
}
