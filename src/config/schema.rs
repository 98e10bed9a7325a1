//! Configuration schema for art
//!
//! Configuration is stored at `~/.config/art/config.toml`

use crate::error::{ArtError, ArtResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Kind of credential held in `token`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Personal or project access token
    #[default]
    Private,
    /// CI job token
    Job,
    /// OAuth access token from the device flow
    Oauth,
}

impl TokenType {
    /// Name used in the config file and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Job => "job",
            Self::Oauth => "oauth",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = ArtError;

    fn from_str(s: &str) -> ArtResult<Self> {
        match s {
            "private" => Ok(Self::Private),
            "job" => Ok(Self::Job),
            "oauth" => Ok(Self::Oauth),
            other => Err(ArtError::config(
                "token_type",
                format!("Unknown token type: {}", other),
            )),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Schema version written by the migration step
    #[serde(default)]
    pub schema_version: u32,

    /// GitLab base URL, e.g. `https://gitlab.example.com/`
    pub gitlab_url: String,

    /// Kind of `token`
    pub token_type: TokenType,

    /// Access token
    pub token: String,

    /// OAuth application id (oauth only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,

    /// OAuth refresh token (oauth only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Config {
    /// Configuration for a static token
    pub fn with_token(
        gitlab_url: impl Into<String>,
        token_type: TokenType,
        token: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            gitlab_url: gitlab_url.into(),
            token_type,
            token: token.into(),
            oauth_client_id: None,
            refresh_token: None,
        }
    }

    /// Check required values are present and usable
    pub fn validate(&self) -> ArtResult<()> {
        if self.gitlab_url.trim().is_empty() {
            return Err(ArtError::config(
                "gitlab_url",
                "Required config element is missing. Run \"art configure\".",
            ));
        }
        if !self.gitlab_url.starts_with("http://") && !self.gitlab_url.starts_with("https://") {
            return Err(ArtError::config(
                "gitlab_url",
                format!("Not an http(s) URL: {}", self.gitlab_url),
            ));
        }
        if self.token.is_empty() {
            return Err(ArtError::config(
                "token",
                "Required config element is missing. Run \"art configure\".",
            ));
        }
        if self.token_type == TokenType::Oauth && self.oauth_client_id.is_none() {
            return Err(ArtError::config(
                "oauth_client_id",
                "OAuth tokens need the application id. Run \"art configure\".",
            ));
        }
        Ok(())
    }
}
