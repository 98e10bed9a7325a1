//! Configuration management for art

pub mod migrate;
pub mod schema;

pub use schema::{Config, TokenType, SCHEMA_VERSION};

use crate::error::{ArtError, ArtResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cache directory used inside GitLab CI, relative to the working directory
pub const CI_CACHE_DIR: &str = ".art-cache";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("art")
            .join("config.toml")
    }

    /// Get the default cache directory
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("art")
    }

    /// Pick the cache root: explicit option, CI-local directory, user cache
    pub fn cache_root(explicit: Option<&Path>, work_dir: &Path) -> PathBuf {
        Self::cache_root_with(explicit, work_dir, |k| std::env::var(k).ok())
    }

    fn cache_root_with(
        explicit: Option<&Path>,
        work_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> PathBuf {
        match explicit {
            Some(path) => path.to_path_buf(),
            None if env("GITLAB_CI").is_some() => work_dir.join(CI_CACHE_DIR),
            None => Self::default_cache_dir(),
        }
    }

    /// Load configuration, falling back to the CI environment when no file exists
    pub fn load(&self) -> ArtResult<Config> {
        if !self.config_path.exists() {
            if let Some(config) = Self::from_env()? {
                debug!("Config file not found, using GitLab CI environment");
                return Ok(config);
            }
            return Err(ArtError::ConfigMissing(self.config_path.clone()));
        }

        self.load_from_file(&self.config_path)
    }

    /// Load configuration from a specific file, upgrading older layouts
    pub fn load_from_file(&self, path: &Path) -> ArtResult<Config> {
        let content = fs::read_to_string(path)
            .map_err(|e| ArtError::io(format!("reading config from {}", path.display()), e))?;

        let mut table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            ArtError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if table.is_empty() {
            return Err(ArtError::ConfigMissing(path.to_path_buf()));
        }

        migrate::migrate(&mut table);

        if let Some(kind) = table.get("token_type") {
            match kind.as_str() {
                Some(name) => {
                    name.parse::<TokenType>()?;
                }
                None => {
                    return Err(ArtError::config("token_type", "Must be a string"));
                }
            }
        }
        for key in ["gitlab_url", "token"] {
            if !table.contains_key(key) {
                return Err(ArtError::config(
                    key,
                    "Required config element is missing. Run \"art configure\".",
                ));
            }
        }

        let config: Config =
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| ArtError::ConfigParse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration derived from a GitLab CI job environment, if running in one
    pub fn from_env() -> ArtResult<Option<Config>> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    fn from_env_with(env: impl Fn(&str) -> Option<String>) -> ArtResult<Option<Config>> {
        if env("GITLAB_CI").is_none() {
            return Ok(None);
        }

        let token = env("CI_JOB_TOKEN")
            .or_else(|| env("CI_BUILD_TOKEN"))
            .ok_or_else(|| ArtError::config("token", "CI_JOB_TOKEN is not set"))?;
        let project_url = env("CI_PROJECT_URL")
            .ok_or_else(|| ArtError::config("gitlab_url", "CI_PROJECT_URL is not set"))?;
        let project_path = env("CI_PROJECT_PATH")
            .ok_or_else(|| ArtError::config("gitlab_url", "CI_PROJECT_PATH is not set"))?;

        let gitlab_url = project_url
            .strip_suffix(project_path.as_str())
            .ok_or_else(|| {
                ArtError::config(
                    "gitlab_url",
                    format!("{:?} doesn't end with {:?}", project_url, project_path),
                )
            })?;

        Ok(Some(Config::with_token(gitlab_url, TokenType::Job, token)))
    }

    /// Save configuration to file
    ///
    /// Written to a 0600 temporary file beside the target, then renamed over it.
    pub fn save(&self, config: &Config) -> ArtResult<()> {
        let dir = self.ensure_config_dir()?;
        let content = toml::to_string_pretty(config)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".config-")
            .tempfile_in(&dir)
            .map_err(|e| ArtError::io(format!("creating temp file in {}", dir.display()), e))?;
        let write_err = |e: std::io::Error| {
            ArtError::io(format!("writing config to {}", self.config_path.display()), e)
        };
        temp.write_all(content.as_bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.config_path).map_err(|e| write_err(e.error))?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists, returning it
    fn ensure_config_dir(&self) -> ArtResult<PathBuf> {
        let parent = match self.config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| ArtError::ConfigDirCreate {
            path: parent.clone(),
            source: e,
        })?;
        Ok(parent)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
