//! Download command - fill the cache from the lock manifest

use super::Invocation;
use crate::error::ArtResult;
use crate::gitlab::LazyApi;
use crate::ui::{self, UiContext};
use crate::workflow;

/// Execute the download command
pub fn execute(invocation: &Invocation) -> ArtResult<()> {
    let ctx = invocation.context(UiContext::detect());
    let mut api = LazyApi::new(|| invocation.connect(&ctx.ui));

    let records = workflow::download(&ctx, &mut api)?;
    ui::outro_success(
        &ctx.ui,
        &format!(
            "{} archive(s) cached in {}",
            records.len(),
            ctx.cache.root().display()
        ),
    );
    Ok(())
}
