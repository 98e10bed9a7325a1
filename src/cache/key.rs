//! Cache keys derived from project and resolved identifier

use crate::error::{ArtError, ArtResult};
use crate::manifest::{ResolvedEntry, SourceKind};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Cache-relative location of one archive: `<project>/<id>[.zip]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    project: String,
    file_name: String,
}

impl CacheKey {
    /// Build a key, rejecting projects or names that would escape the cache root
    pub fn new(project: &str, file_name: &str) -> ArtResult<Self> {
        let project = project.trim_matches('/');
        if project.is_empty() {
            return Err(ArtError::PathInvalid {
                path: PathBuf::from(project),
                reason: "empty project name".to_string(),
            });
        }
        let escapes = Path::new(project)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(ArtError::PathInvalid {
                path: PathBuf::from(project),
                reason: "project must be a relative path without '..'".to_string(),
            });
        }
        if file_name.is_empty() || file_name.contains('/') || file_name.starts_with('.') {
            return Err(ArtError::PathInvalid {
                path: PathBuf::from(file_name),
                reason: "invalid cache file name".to_string(),
            });
        }

        Ok(Self {
            project: project.to_string(),
            file_name: file_name.to_string(),
        })
    }

    /// Key for a lock record
    ///
    /// Job artifacts and repository archives are always zip files; package
    /// files keep whatever format they were uploaded in.
    pub fn for_entry(resolved: &ResolvedEntry) -> ArtResult<Self> {
        let file_name = match resolved.entry.source {
            SourceKind::CiJob | SourceKind::Repository => format!("{}.zip", resolved.resolved_id),
            SourceKind::GenericPackage => resolved.resolved_id.clone(),
        };
        Self::new(&resolved.entry.project, &file_name)
    }

    /// Project part of the key
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Path relative to the cache root
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in self.project.split('/') {
            path.push(part);
        }
        path.push(&self.file_name);
        path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArtifactEntry;
    use indexmap::IndexMap;

    fn resolved(source: SourceKind, id: &str) -> ResolvedEntry {
        ResolvedEntry::new(
            ArtifactEntry {
                project: "group/proj".into(),
                source,
                git_ref: "main".into(),
                job: None,
                package: None,
                filename: None,
                extract: true,
                install: IndexMap::new(),
            },
            id,
        )
    }

    #[test]
    fn key_per_source_kind() {
        let key = CacheKey::for_entry(&resolved(SourceKind::CiJob, "42")).unwrap();
        assert_eq!(key.to_string(), "group/proj/42.zip");

        let key = CacheKey::for_entry(&resolved(SourceKind::Repository, "deadbeef")).unwrap();
        assert_eq!(key.to_string(), "group/proj/deadbeef.zip");

        let key = CacheKey::for_entry(&resolved(SourceKind::GenericPackage, "7")).unwrap();
        assert_eq!(key.to_string(), "group/proj/7");
    }

    #[test]
    fn relative_path_nests_namespaces() {
        let key = CacheKey::new("a/b/c", "1.zip").unwrap();
        assert_eq!(key.relative_path(), PathBuf::from("a").join("b").join("c").join("1.zip"));
        assert_eq!(key.project(), "a/b/c");
    }

    #[test]
    fn rejects_escaping_keys() {
        assert!(CacheKey::new("../etc", "1.zip").is_err());
        assert!(CacheKey::new("a/../../b", "1.zip").is_err());
        assert!(CacheKey::new("", "1.zip").is_err());
        assert!(CacheKey::new("a", "x/y").is_err());
        assert!(CacheKey::new("a", ".hidden").is_err());
    }
}
