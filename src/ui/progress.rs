//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
    quiet: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        }
        // Plain mode prints only the outcome
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if !self.quiet {
            println!("  {} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if !self.quiet {
            println!("  {} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Byte progress for an archive download
///
/// Shows an indicatif bar in interactive mode and a start line in CI.
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    /// Start tracking a download of `length` bytes (unknown when `None`)
    pub fn new(ctx: &UiContext, label: &str, length: Option<u64>) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = match length {
                Some(len) => ProgressBar::new(len),
                None => ProgressBar::new_spinner(),
            };
            let template = if length.is_some() {
                "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {bytes}/{total_bytes} {bytes_per_sec:.dim}"
            } else {
                "  {spinner:.cyan} {prefix}  {bytes} {bytes_per_sec:.dim}"
            };
            if let Ok(progress_style) = ProgressStyle::default_bar().template(template) {
                bar.set_style(
                    progress_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(label.to_string());
            Some(bar)
        } else {
            if !ctx.is_quiet() {
                println!("  {} {} => downloading...", style("...").dim(), label);
            }
            None
        };
        Self { bar }
    }

    /// Wrap a reader so every byte read advances the bar
    pub fn wrap<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match &self.bar {
            Some(bar) => Box::new(bar.wrap_read(reader)),
            None => Box::new(reader),
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
