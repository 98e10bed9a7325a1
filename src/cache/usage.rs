//! Cache inspection and maintenance

use crate::cache::store::Cache;
use crate::error::{ArtError, ArtResult};
use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Cached archives of one project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectUsage {
    /// Project path with namespace
    pub project: String,
    /// Cached archive files
    pub files: Vec<PathBuf>,
    /// Aggregate size in bytes
    pub size_bytes: u64,
    /// Most recent modification time
    pub modified: Option<DateTime<Utc>>,
}

impl Cache {
    /// List cached archives grouped by project, sorted by project name
    pub fn list(&self) -> ArtResult<Vec<ProjectUsage>> {
        let mut projects: BTreeMap<String, ProjectUsage> = BTreeMap::new();

        if !self.root().is_dir() {
            return Ok(Vec::new());
        }

        for entry in WalkDir::new(self.root()).min_depth(2) {
            let entry = entry.map_err(walk_error)?;

            if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.')
            {
                continue;
            }

            let Some(project) = project_of(self.root(), entry.path()) else {
                continue;
            };
            let metadata = entry.metadata().map_err(walk_error)?;
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            let usage = projects
                .entry(project.clone())
                .or_insert_with(|| ProjectUsage {
                    project,
                    files: Vec::new(),
                    size_bytes: 0,
                    modified: None,
                });
            usage.files.push(entry.path().to_path_buf());
            usage.size_bytes += metadata.len();
            usage.modified = usage.modified.max(modified);
        }

        Ok(projects.into_values().collect())
    }

    /// Remove cached archives of every project matching one of `patterns`
    ///
    /// No patterns selects every project. A pattern that selects nothing is an
    /// error, reported before anything is removed. Returns the selected projects.
    pub fn purge(&self, patterns: &[String], dry_run: bool) -> ArtResult<Vec<ProjectUsage>> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ArtError::User(format!("Invalid pattern '{}': {}", p, e)))
            })
            .collect::<ArtResult<Vec<_>>>()?;

        let projects = self.list()?;

        let unmatched: Vec<&str> = patterns
            .iter()
            .zip(&compiled)
            .filter(|(_, pattern)| !projects.iter().any(|u| pattern.matches(&u.project)))
            .map(|(raw, _)| raw.as_str())
            .collect();
        if !unmatched.is_empty() {
            return Err(ArtError::PurgeUnmatched(unmatched.join(", ")));
        }

        let selected: Vec<ProjectUsage> = projects
            .into_iter()
            .filter(|u| compiled.is_empty() || compiled.iter().any(|p| p.matches(&u.project)))
            .collect();

        if dry_run {
            return Ok(selected);
        }

        for usage in &selected {
            for file in &usage.files {
                debug!("Removing {}", file.display());
                fs::remove_file(file)
                    .map_err(|e| ArtError::io(format!("removing {}", file.display()), e))?;
            }
            if let Some(dir) = usage.files.first().and_then(|f| f.parent()) {
                self.remove_empty_dirs(dir);
            }
        }

        Ok(selected)
    }

    /// Remove `dir` and its ancestors below the cache root while they are empty
    fn remove_empty_dirs(&self, dir: &Path) {
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == self.root() || !dir.starts_with(self.root()) {
                break;
            }
            // Fails on non-empty directories, which ends the walk
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn walk_error(e: walkdir::Error) -> ArtError {
    let context = match e.path() {
        Some(path) => format!("walking cache directory at {}", path.display()),
        None => "walking cache directory".to_string(),
    };
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    ArtError::io(context, source)
}

/// Project name for a cached file: its parent directory relative to the root
fn project_of(root: &Path, file: &Path) -> Option<String> {
    let parent = file.parent()?.strip_prefix(root).ok()?;
    let parts: Vec<String> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use tempfile::TempDir;

    fn populated() -> (TempDir, Cache) {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path());
        cache
            .save(&CacheKey::new("group/app", "1.zip").unwrap(), &[0u8; 100][..])
            .unwrap();
        cache
            .save(&CacheKey::new("group/app", "2.zip").unwrap(), &[0u8; 50][..])
            .unwrap();
        cache
            .save(&CacheKey::new("group/lib", "9.zip").unwrap(), &[0u8; 10][..])
            .unwrap();
        cache
            .save(&CacheKey::new("other", "abc").unwrap(), &[0u8; 1][..])
            .unwrap();
        (dir, cache)
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn list_groups_by_project() {
        let (_dir, cache) = populated();
        let usage = cache.list().unwrap();

        let names: Vec<_> = usage.iter().map(|u| u.project.as_str()).collect();
        assert_eq!(names, vec!["group/app", "group/lib", "other"]);
        assert_eq!(usage[0].size_bytes, 150);
        assert_eq!(usage[0].files.len(), 2);
        assert!(usage[0].modified.is_some());
    }

    #[test]
    fn list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("absent"));
        assert!(cache.list().unwrap().is_empty());
    }

    #[test]
    fn list_skips_temp_files() {
        let (dir, cache) = populated();
        fs::write(dir.path().join("group/app/.tmp-abc"), b"partial").unwrap();
        let usage = cache.list().unwrap();
        assert_eq!(usage[0].files.len(), 2);
    }

    #[test]
    fn purge_by_glob() {
        let (dir, cache) = populated();
        let removed = cache.purge(&["group/*".to_string()], false).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("group").exists());
        assert!(dir.path().join("other/abc").exists());
    }

    #[test]
    fn purge_dry_run_keeps_files() {
        let (dir, cache) = populated();
        let selected = cache.purge(&[], true).unwrap();

        assert_eq!(selected.len(), 3);
        assert!(dir.path().join("group/app/1.zip").exists());
    }

    #[test]
    fn purge_all() {
        let (dir, cache) = populated();
        cache.purge(&[], false).unwrap();
        assert!(cache.list().unwrap().is_empty());
        assert!(dir.path().exists());
    }

    #[test]
    fn purge_unmatched_pattern_errors_without_removing() {
        let (dir, cache) = populated();
        let err = cache
            .purge(&["other".to_string(), "typo/*".to_string()], false)
            .unwrap_err();

        assert!(matches!(err, ArtError::PurgeUnmatched(ref p) if p == "typo/*"));
        assert!(dir.path().join("other/abc").exists());
    }
}
