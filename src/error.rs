//! Error types for art
//!
//! All modules use `ArtResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for art operations
pub type ArtResult<T> = Result<T, ArtError>;

/// All errors that can occur in art
#[derive(Error, Debug)]
pub enum ArtError {
    // Configuration errors
    #[error("No configuration found at {0}")]
    ConfigMissing(PathBuf),

    #[error("config.{key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Manifest errors
    #[error("{path}: {reason}")]
    ManifestMissing { path: PathBuf, reason: String },

    #[error("Invalid manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    // Resolution errors
    #[error("{0}")]
    NotFound(String),

    #[error("Found {count} generic packages named '{name}' version '{version}' in {project}, expected exactly one")]
    AmbiguousPackage {
        project: String,
        name: String,
        version: String,
        count: usize,
    },

    // Network errors
    #[error("{context}: {reason}")]
    Network { context: String, reason: String },

    #[error("GitLab authentication failed for {url}: {reason}")]
    Authentication { url: String, reason: String },

    #[error("OAuth authorization failed: {0}")]
    OAuth(String),

    // Cache errors
    #[error("Cache entry not found: {0}")]
    CacheMiss(String),

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Pattern(s) did not match any cached project: {0}")]
    PurgeUnmatched(String),

    // Install errors
    #[error(
        "Source path(s) did not match any files/non-empty directories in the archive:\n  archive: {archive}\n  project: {project}\n  ref: {git_ref}\n  id: {resolved_id}\n    {}",
        .unmatched.join("\n    ")
    )]
    InstallUnmatched {
        archive: PathBuf,
        project: String,
        git_ref: String,
        resolved_id: String,
        unmatched: Vec<String>,
    },

    #[error("Source path '{source_path}' of {project} requires extraction, but extract is disabled")]
    InstallRequiresExtraction {
        project: String,
        source_path: String,
    },

    #[error("Conflicting install destination {destination}: '{first}' and '{second}' both map to it")]
    InstallConflict {
        destination: String,
        first: String,
        second: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ArtError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error with context
    pub fn network(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error for a config key
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is the internal cache-miss signal
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigMissing(_) => Some("Run: art configure <gitlab_url> <token>"),
            Self::ConfigInvalid { .. } => Some("Run: art configure"),
            Self::Authentication { .. } => Some("Check the token, or run: art configure"),
            Self::ManifestMissing { .. } => Some("Run: art update"),
            Self::InstallRequiresExtraction { .. } => {
                Some("Use '.' as the only source path, or set extract: true")
            }
            Self::ChecksumMismatch { .. } => Some("Run: art update"),
            _ => None,
        }
    }
}
