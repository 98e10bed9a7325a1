//! Cache command - inspect and purge cached archives

use super::Invocation;
use crate::cache::{format_bytes, ProjectUsage};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::error::ArtResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub fn execute(args: CacheArgs, invocation: &Invocation) -> ArtResult<()> {
    let ctx = invocation.context(UiContext::detect());

    match args.action {
        CacheAction::List {
            sort_size,
            human_readable,
        } => {
            let mut projects = ctx.cache.list()?;
            if sort_size {
                projects.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
            }
            print_usage(&projects, human_readable);
            Ok(())
        }
        CacheAction::Purge { patterns, dry_run } => {
            let purged = ctx.cache.purge(&patterns, dry_run)?;
            report_purge(&ctx.ui, &purged, dry_run);
            Ok(())
        }
    }
}

fn size_column(bytes: u64, human_readable: bool) -> String {
    if human_readable {
        format_bytes(bytes)
    } else {
        bytes.to_string()
    }
}

fn print_usage(projects: &[ProjectUsage], human_readable: bool) {
    for usage in projects {
        println!(
            "{:>10}  {}",
            size_column(usage.size_bytes, human_readable),
            usage.project
        );
    }
}

fn report_purge(ui: &UiContext, purged: &[ProjectUsage], dry_run: bool) {
    if purged.is_empty() {
        ui::step_info(ui, "Cache is empty");
        return;
    }

    let total: u64 = purged.iter().map(|u| u.size_bytes).sum();
    for usage in purged {
        let message = format!(
            "{} ({} archive(s), {})",
            usage.project,
            usage.files.len(),
            format_bytes(usage.size_bytes)
        );
        if dry_run {
            ui::remark(ui, &format!("would remove {}", message));
        } else {
            ui::step_ok(ui, &format!("removed {}", message));
        }
    }

    let verb = if dry_run { "Would free" } else { "Freed" };
    ui::outro_success(
        ui,
        &format!("{} {}", verb, style(format_bytes(total)).bold()),
    );
}
