//! Declarative and lock manifests
//!
//! `artifacts.yml` lists what to fetch; `artifacts.lock.yml` pins every entry
//! to an immutable identifier so `download` and `install` are reproducible.

pub mod entry;

pub use entry::{ArtifactEntry, ResolvedEntry, SourceKind};

use crate::error::{ArtError, ArtResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Declarative manifest file name
pub const ARTIFACTS_FILE: &str = "artifacts.yml";

/// Lock manifest file name
pub const ARTIFACTS_LOCK_FILE: &str = "artifacts.lock.yml";

/// Paths of the two manifests for a working directory
#[derive(Debug, Clone)]
pub struct ManifestPaths {
    pub artifacts: PathBuf,
    pub lock: PathBuf,
}

impl ManifestPaths {
    /// Manifests in the given directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            artifacts: dir.join(ARTIFACTS_FILE),
            lock: dir.join(ARTIFACTS_LOCK_FILE),
        }
    }

    /// Load `artifacts.yml`; an absent or empty file is an error
    pub fn load_artifacts(&self) -> ArtResult<Vec<ArtifactEntry>> {
        let entries: Vec<ArtifactEntry> = load_yaml(&self.artifacts)?.unwrap_or_default();
        if entries.is_empty() {
            return Err(ArtError::ManifestMissing {
                path: self.artifacts.clone(),
                reason: "file was not found or did not contain any entries".to_string(),
            });
        }
        for entry in &entries {
            validate_entry(entry, &self.artifacts)?;
        }
        Ok(entries)
    }

    /// Load `artifacts.lock.yml`; an absent or empty file is an error
    pub fn load_lock(&self) -> ArtResult<Vec<ResolvedEntry>> {
        let entries: Vec<ResolvedEntry> = load_yaml(&self.lock)?.unwrap_or_default();
        if entries.is_empty() {
            return Err(ArtError::ManifestMissing {
                path: self.lock.clone(),
                reason: "no entries found".to_string(),
            });
        }
        Ok(entries)
    }

    /// Load `artifacts.lock.yml` if present
    pub fn load_lock_optional(&self) -> ArtResult<Vec<ResolvedEntry>> {
        Ok(load_yaml(&self.lock)?.unwrap_or_default())
    }

    /// Write `artifacts.lock.yml`
    pub fn save_lock(&self, entries: &[ResolvedEntry]) -> ArtResult<()> {
        save_yaml(&self.lock, &entries)
    }
}

/// Check the kind-specific selectors an entry needs
fn validate_entry(entry: &ArtifactEntry, path: &Path) -> ArtResult<()> {
    let missing = match entry.source {
        SourceKind::CiJob if entry.job.is_none() => Some("job"),
        SourceKind::GenericPackage if entry.package.is_none() => Some("package"),
        SourceKind::GenericPackage if entry.filename.is_none() => Some("filename"),
        _ => None,
    };

    match missing {
        Some(field) => Err(ArtError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: format!(
                "{} entry for {} is missing '{}'",
                entry.source, entry.project, field
            ),
        }),
        None => Ok(()),
    }
}

/// Read a YAML document, returning `None` when the file does not exist
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> ArtResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not found", path.display());
            return Ok(None);
        }
        Err(e) => return Err(ArtError::io(format!("reading {}", path.display()), e)),
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_yaml::from_str(&content).map_err(|e| ArtError::ManifestInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a YAML document
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> ArtResult<()> {
    let content = serde_yaml::to_string(value)?;
    fs::write(path, content).map_err(|e| ArtError::io(format!("writing {}", path.display()), e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
