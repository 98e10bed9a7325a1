//! Configure command - store the GitLab URL and token

use super::show_device_code;
use crate::cli::args::ConfigureArgs;
use crate::config::{Config, ConfigManager, TokenType};
use crate::error::ArtResult;
use crate::gitlab::oauth::{self, DeviceAuthorization};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the configure command
///
/// For oauth the token argument is the application id; the device flow runs
/// here and the resulting token pair is what gets saved.
pub fn execute(args: ConfigureArgs, manager: &ConfigManager) -> ArtResult<()> {
    let ctx = UiContext::detect();
    let token_type = TokenType::from(args.token_type);

    let mut config = Config::with_token(&args.gitlab_url, token_type, &args.token);
    config.validate()?;

    if token_type == TokenType::Oauth {
        debug!("Starting device authorization for {}", args.gitlab_url);
        let prompt = |device: &DeviceAuthorization| show_device_code(&ctx, device);
        let tokens = oauth::authorize(&config.gitlab_url, &args.token, &prompt)?;
        config.token = tokens.access_token;
        config.refresh_token = Some(tokens.refresh_token);
        config.oauth_client_id = Some(args.token);
    }

    manager.save(&config)?;
    ui::step_ok_detail(
        &ctx,
        &format!("Configured {} with a {} token", config.gitlab_url, token_type),
        &manager.path().display().to_string(),
    );
    Ok(())
}
