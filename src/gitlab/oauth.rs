//! OAuth 2.0 device authorization grant against GitLab
//!
//! GitLab answers some non-fatal token endpoint states (pending, slow down)
//! with HTTP error codes, so responses are read as JSON regardless of status.

use crate::error::{ArtError, ArtResult};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use ureq::Agent;

/// Grant type from RFC 8628 section 3.4
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// What the user must do to approve this device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl DeviceAuthorization {
    /// URL to open, with the code already filled in when the server supports it
    pub fn url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

fn default_interval() -> u64 {
    5
}

/// An access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Raw token endpoint response: either tokens or an error code
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// What to do after one poll of the token endpoint
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Done(Tokens),
    Wait,
    SlowDown,
    Failed(String),
}

impl TokenResponse {
    fn outcome(self) -> PollOutcome {
        if let (Some(access_token), Some(refresh_token)) = (self.access_token, self.refresh_token)
        {
            return PollOutcome::Done(Tokens {
                access_token,
                refresh_token,
            });
        }
        match self.error.as_deref() {
            Some("authorization_pending") => PollOutcome::Wait,
            Some("slow_down") => PollOutcome::SlowDown,
            Some(error) => PollOutcome::Failed(match self.error_description {
                Some(description) => format!("{} ({})", description, error),
                None => error.to_string(),
            }),
            None => PollOutcome::Failed("invalid API response".to_string()),
        }
    }
}

fn agent() -> Agent {
    let config = Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(REQUEST_TIMEOUT))
        .http_status_as_error(false)
        .build();
    Agent::new_with_config(config)
}

fn endpoint(gitlab_url: &str, path: &str) -> String {
    format!("{}{}", gitlab_url.trim_end_matches('/'), path)
}

fn post_form<T: for<'de> Deserialize<'de>>(
    agent: &Agent,
    url: &str,
    form: &[(&str, &str)],
) -> ArtResult<T> {
    debug!("POST {}", url);
    let mut response = agent
        .post(url)
        .send_form(form.iter().copied())
        .map_err(|e| ArtError::network(format!("Connection to {} failed", url), e))?;
    let status = response.status();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ArtError::network(format!("Reading response from {}", url), e))?;
    serde_json::from_str(&text).map_err(|_| {
        ArtError::OAuth(format!(
            "invalid API response (HTTP {})",
            status.as_u16()
        ))
    })
}

/// Run the device flow: request a code, show it via `prompt`, wait for approval
pub fn authorize(
    gitlab_url: &str,
    client_id: &str,
    prompt: &dyn Fn(&DeviceAuthorization),
) -> ArtResult<Tokens> {
    let agent = agent();
    let url = endpoint(gitlab_url, "/oauth/authorize_device");
    let response: serde_json::Value = post_form(
        &agent,
        &url,
        &[("client_id", client_id), ("scope", "read_api")],
    )?;

    if let Some(error) = response.get("error").and_then(|e| e.as_str()) {
        let description = response
            .get("error_description")
            .and_then(|d| d.as_str())
            .unwrap_or_default();
        return Err(ArtError::OAuth(format!("{} {}", error, description).trim().to_string()));
    }

    let device: DeviceAuthorization = serde_json::from_value(response)?;
    prompt(&device);
    wait_for_token(&agent, gitlab_url, client_id, &device)
}

fn wait_for_token(
    agent: &Agent,
    gitlab_url: &str,
    client_id: &str,
    device: &DeviceAuthorization,
) -> ArtResult<Tokens> {
    let url = endpoint(gitlab_url, "/oauth/token");
    let mut interval = device.interval.max(1);

    loop {
        let response: TokenResponse = post_form(
            agent,
            &url,
            &[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", client_id),
                ("device_code", &device.device_code),
            ],
        )?;

        match response.outcome() {
            PollOutcome::Done(tokens) => {
                info!("Device authorization complete");
                return Ok(tokens);
            }
            PollOutcome::Wait => {}
            PollOutcome::SlowDown => interval += 1,
            PollOutcome::Failed(reason) => return Err(ArtError::OAuth(reason)),
        }

        thread::sleep(Duration::from_secs(interval));
    }
}

/// Exchange a refresh token for a new pair, or start a new authorization
pub fn refresh(
    gitlab_url: &str,
    client_id: &str,
    refresh_token: Option<&str>,
    prompt: &dyn Fn(&DeviceAuthorization),
) -> ArtResult<Tokens> {
    let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
        return authorize(gitlab_url, client_id, prompt);
    };

    let response: TokenResponse = post_form(
        &agent(),
        &endpoint(gitlab_url, "/oauth/token"),
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ],
    )?;

    match response.outcome() {
        PollOutcome::Done(tokens) => Ok(tokens),
        other => {
            info!("Refresh token not accepted ({:?}), authorizing again", other);
            authorize(gitlab_url, client_id, prompt)
        }
    }
}
