//! Removing previously installed destinations

use crate::error::{ArtError, ArtResult};
use indexmap::IndexMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// What happened to one recorded destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// A file was removed (or would be, on a dry run)
    File,
    /// An empty directory was removed (or would be)
    Directory,
    /// Nothing to do: already gone, or a directory still holding other files
    Skipped,
}

/// Remove the destinations of `files` below `base`, last recorded first
///
/// Reverse order means files are gone before the directories recorded
/// ahead of them. Returns each destination with its outcome.
pub fn remove_installed(
    files: &IndexMap<String, String>,
    base: &Path,
    dry_run: bool,
) -> ArtResult<Vec<(String, Removal)>> {
    let mut outcomes = Vec::with_capacity(files.len());
    for destination in files.values().rev() {
        let outcome = remove_one(&base.join(destination), dry_run)?;
        debug!("clean {}: {:?}", destination, outcome);
        outcomes.push((destination.clone(), outcome));
    }
    Ok(outcomes)
}

fn remove_one(path: &Path, dry_run: bool) -> ArtResult<Removal> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::Skipped),
        Err(e) => return Err(ArtError::io(format!("inspecting {}", path.display()), e)),
    };

    if meta.is_dir() {
        let empty = fs::read_dir(path)
            .map_err(|e| ArtError::io(format!("reading {}", path.display()), e))?
            .next()
            .is_none();
        if !empty {
            return Ok(Removal::Skipped);
        }
        if !dry_run {
            fs::remove_dir(path)
                .map_err(|e| ArtError::io(format!("removing {}", path.display()), e))?;
        }
        return Ok(Removal::Directory);
    }

    if !dry_run {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::Skipped),
            Err(e) => return Err(ArtError::io(format!("removing {}", path.display()), e)),
        }
    }
    Ok(Removal::File)
}
