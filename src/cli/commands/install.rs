//! Install command - copy locked artifacts into the working directory

use super::{print_json, Invocation};
use crate::cli::args::InstallArgs;
use crate::error::ArtResult;
use crate::gitlab::LazyApi;
use crate::ui::{self, UiContext};
use crate::workflow::{self, InstallOptions};

/// Execute the install command
///
/// Works offline when every archive is cached; the GitLab client is only
/// created for a cache miss.
pub fn execute(args: InstallArgs, invocation: &Invocation) -> ArtResult<()> {
    let ctx = invocation.context(UiContext::detect().with_quiet(args.json));
    let mut api = LazyApi::new(|| invocation.connect(&ctx.ui));

    let options = InstallOptions {
        keep_empty_dirs: args.keep_empty_dirs,
        refresh: args.refresh,
    };
    let reports = workflow::install(&ctx, &mut api, options)?;

    if args.json {
        return print_json(&reports);
    }
    let files: usize = reports.iter().map(|r| r.installed.len()).sum();
    ui::outro_success(
        &ctx.ui,
        &format!("Installed {} file(s) from {} artifact(s)", files, reports.len()),
    );
    Ok(())
}
