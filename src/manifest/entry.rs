//! Artifact entry and lock record types

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Where an artifact archive comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Artifacts of the last successful CI job on a ref
    #[default]
    CiJob,
    /// Repository archive of the commit a branch or tag points at
    Repository,
    /// A file from a generic package registry entry
    GenericPackage,
}

impl SourceKind {
    /// Whether archives of this kind wrap their content in a synthetic top-level directory
    pub fn has_archive_prefix(&self) -> bool {
        matches!(self, Self::Repository)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CiJob => "ci-job",
            Self::Repository => "repository",
            Self::GenericPackage => "generic-package",
        };
        write!(f, "{}", name)
    }
}

fn default_extract() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// One declared artifact in `artifacts.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Project path with namespace, e.g. `group/project`
    pub project: String,

    /// Source kind
    #[serde(default)]
    pub source: SourceKind,

    /// Branch, tag or package version
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// CI job name (ci-job)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,

    /// Package name (generic-package)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Package file name (generic-package)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Extract the archive (default) or install it as a single file
    #[serde(default = "default_extract", skip_serializing_if = "is_true")]
    pub extract: bool,

    /// Source pattern => destination path, in declared order
    #[serde(default)]
    pub install: IndexMap<String, String>,
}

impl ArtifactEntry {
    /// Short description used in progress and error messages
    pub fn describe(&self) -> String {
        match self.source {
            SourceKind::CiJob => format!(
                "{} {} job '{}'",
                self.project,
                self.git_ref,
                self.job.as_deref().unwrap_or("?")
            ),
            SourceKind::Repository => format!("{} {}", self.project, self.git_ref),
            SourceKind::GenericPackage => format!(
                "{} package {}/{}",
                self.project,
                self.package.as_deref().unwrap_or("?"),
                self.git_ref
            ),
        }
    }
}

/// Accept resolved identifiers written either as strings or as bare integers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

/// One record in `artifacts.lock.yml`: the entry pinned to immutable content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// The declared entry this record was resolved from
    #[serde(flatten)]
    pub entry: ArtifactEntry,

    /// Job id, commit SHA or package file id
    #[serde(alias = "job_id", deserialize_with = "string_or_number")]
    pub resolved_id: String,

    /// Archive file name as known to GitLab
    #[serde(default, rename = "archive", skip_serializing_if = "Option::is_none")]
    pub archive_filename: Option<String>,

    /// SHA-256 of the archive bytes, recorded on first download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Archive member path => destination path, computed by `update`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<IndexMap<String, String>>,
}

impl ResolvedEntry {
    /// Create a lock record without computed files
    pub fn new(entry: ArtifactEntry, resolved_id: impl Into<String>) -> Self {
        Self {
            entry,
            resolved_id: resolved_id.into(),
            archive_filename: None,
            sha256: None,
            files: None,
        }
    }

    /// Archive file name, falling back to a name derived from the identifier
    pub fn archive_name(&self) -> String {
        self.archive_filename
            .clone()
            .unwrap_or_else(|| match self.entry.source {
                SourceKind::GenericPackage => self
                    .entry
                    .filename
                    .clone()
                    .unwrap_or_else(|| self.resolved_id.clone()),
                _ => "artifacts.zip".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_defaults() {
        let yaml = r#"
project: group/proj
ref: main
job: build
install:
  build/: out/
"#;
        let entry: ArtifactEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.source, SourceKind::CiJob);
        assert!(entry.extract);
        assert_eq!(entry.install.get("build/").unwrap(), "out/");
    }

    #[test]
    fn entry_preserves_install_order() {
        let yaml = r#"
project: p
ref: main
job: build
install:
  z.txt: a
  a.txt: b
  m/: c/
"#;
        let entry: ArtifactEntry = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<_> = entry.install.keys().cloned().collect();
        assert_eq!(keys, vec!["z.txt", "a.txt", "m/"]);
    }

    #[test]
    fn source_kind_kebab_case() {
        let yaml = r#"
project: p
source: generic-package
ref: 1.0.0
package: tools
filename: tools.zip
extract: false
"#;
        let entry: ArtifactEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.source, SourceKind::GenericPackage);
        assert!(!entry.extract);
        assert_eq!(entry.source.to_string(), "generic-package");
    }

    #[test]
    fn legacy_lock_record_with_job_id() {
        let yaml = r#"
project: group/proj
ref: main
job: build
install:
  .: out/
job_id: 1234
"#;
        let resolved: ResolvedEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(resolved.resolved_id, "1234");
        assert!(resolved.files.is_none());
        assert_eq!(resolved.entry.job.as_deref(), Some("build"));
    }

    #[test]
    fn lock_record_serializes_flat() {
        let entry = ArtifactEntry {
            project: "p".into(),
            source: SourceKind::Repository,
            git_ref: "v1".into(),
            job: None,
            package: None,
            filename: None,
            extract: true,
            install: IndexMap::new(),
        };
        let resolved = ResolvedEntry::new(entry, "abc123");
        let yaml = serde_yaml::to_string(&resolved).unwrap();
        assert!(yaml.contains("resolved_id: abc123"));
        assert!(yaml.contains("source: repository"));
        assert!(!yaml.contains("extract"));
    }

    #[test]
    fn archive_name_fallbacks() {
        let mut entry = ArtifactEntry {
            project: "p".into(),
            source: SourceKind::GenericPackage,
            git_ref: "1.0".into(),
            job: None,
            package: Some("tools".into()),
            filename: Some("tools.tar".into()),
            extract: false,
            install: IndexMap::new(),
        };
        let resolved = ResolvedEntry::new(entry.clone(), "99");
        assert_eq!(resolved.archive_name(), "tools.tar");

        entry.source = SourceKind::CiJob;
        let resolved = ResolvedEntry::new(entry, "99");
        assert_eq!(resolved.archive_name(), "artifacts.zip");
    }
}
