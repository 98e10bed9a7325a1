//! CLI command implementations

pub mod cache;
pub mod clean;
pub mod completions;
pub mod configure;
pub mod download;
pub mod install;
pub mod update;

pub use cache::execute as cache;
pub use clean::execute as clean;
pub use completions::execute as completions;
pub use configure::execute as configure;
pub use download::execute as download;
pub use install::execute as install;
pub use update::execute as update;

use crate::config::{Config, ConfigManager};
use crate::error::ArtResult;
use crate::gitlab::oauth::DeviceAuthorization;
use crate::gitlab::{GitlabApi, GitlabClient};
use crate::ui::{self, UiContext};
use crate::workflow::Context;
use serde::Serialize;
use std::path::PathBuf;

/// Global options every command shares
pub struct Invocation {
    pub config: ConfigManager,
    /// Explicit `--cache` directory
    pub cache: Option<PathBuf>,
    pub work_dir: PathBuf,
}

impl Invocation {
    /// Pipeline context for this invocation
    pub fn context(&self, ui: UiContext) -> Context {
        let cache_root = ConfigManager::cache_root(self.cache.as_deref(), &self.work_dir);
        Context::new(cache_root, self.work_dir.clone(), ui)
    }

    /// Load the configuration and create an authenticated client
    pub fn connect(&self, ui: &UiContext) -> ArtResult<Box<dyn GitlabApi>> {
        self.connect_with(self.config.load()?, ui)
    }

    /// Create an authenticated client for an already loaded configuration
    pub fn connect_with(&self, config: Config, ui: &UiContext) -> ArtResult<Box<dyn GitlabApi>> {
        let prompt = |device: &DeviceAuthorization| show_device_code(ui, device);
        let client = GitlabClient::connect(&self.config, config, &prompt)?;
        Ok(Box::new(client))
    }
}

/// Ask the user to approve a device authorization
pub(crate) fn show_device_code(ui: &UiContext, device: &DeviceAuthorization) {
    let message = format!(
        "Open {}\nand confirm the code {}",
        device.url(),
        device.user_code
    );
    if ui.is_quiet() {
        // stdout carries the JSON document
        eprintln!("{}", message);
    } else {
        ui::note(ui, "GitLab authorization", &message);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ArtResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
