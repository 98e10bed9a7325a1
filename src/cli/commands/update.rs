//! Update command - resolve the manifest into the lock manifest

use super::{print_json, Invocation};
use crate::cli::args::UpdateArgs;
use crate::config::TokenType;
use crate::error::{ArtError, ArtResult};
use crate::gitlab::LazyApi;
use crate::ui::{self, UiContext};
use crate::workflow::{self, UpdateOptions};

/// Execute the update command
pub fn execute(args: UpdateArgs, invocation: &Invocation) -> ArtResult<()> {
    let ctx = invocation.context(UiContext::detect().with_quiet(args.json));
    let mut api = LazyApi::new(|| {
        let config = invocation.config.load()?;
        // Job tokens cannot list pipelines or packages
        if config.token_type == TokenType::Job {
            return Err(ArtError::config(
                "token_type",
                "A job token cannot be used to update artifacts",
            ));
        }
        invocation.connect_with(config, &ctx.ui)
    });

    ui::intro(&ctx.ui, "art update");
    let options = UpdateOptions {
        keep_empty_dirs: args.keep_empty_dirs,
        clean: args.clean,
    };
    let locked = workflow::update(&ctx, &mut api, options)?;

    if args.json {
        return print_json(&locked);
    }
    ui::outro_success(
        &ctx.ui,
        &format!(
            "Locked {} artifact(s) in {}",
            locked.len(),
            ctx.manifests.lock.display()
        ),
    );
    Ok(())
}
