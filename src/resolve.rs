//! Pinning declared artifacts to immutable identifiers
//!
//! Resolution only reads from GitLab. Re-running it may produce a different
//! identifier when the ref has moved; that is how "latest successful" works.

use crate::error::{ArtError, ArtResult};
use crate::gitlab::{Download, GitlabApi};
use crate::manifest::{ArtifactEntry, ResolvedEntry, SourceKind};
use tracing::debug;

/// Resolve one entry to a lock record (without computed `files`)
pub fn resolve(api: &dyn GitlabApi, entry: &ArtifactEntry) -> ArtResult<ResolvedEntry> {
    match entry.source {
        SourceKind::CiJob => resolve_ci_job(api, entry),
        SourceKind::Repository => resolve_repository(api, entry),
        SourceKind::GenericPackage => resolve_generic_package(api, entry),
    }
}

/// Open the archive byte stream of a resolved entry
pub fn download(api: &dyn GitlabApi, resolved: &ResolvedEntry) -> ArtResult<Download> {
    let entry = &resolved.entry;
    match entry.source {
        SourceKind::CiJob => api.job_artifacts(&entry.project, &resolved.resolved_id),
        SourceKind::Repository => api.repository_archive(&entry.project, &resolved.resolved_id),
        SourceKind::GenericPackage => api.package_file(
            &entry.project,
            required(entry, entry.package.as_deref(), "package")?,
            &entry.git_ref,
            required(entry, entry.filename.as_deref(), "filename")?,
        ),
    }
}

fn required<'a>(entry: &ArtifactEntry, value: Option<&'a str>, field: &str) -> ArtResult<&'a str> {
    value.ok_or_else(|| {
        ArtError::User(format!(
            "{} entry for {} needs a '{}' field",
            entry.source, entry.project, field
        ))
    })
}

/// Newest pipeline first; the first successful job with the right name wins
fn resolve_ci_job(api: &dyn GitlabApi, entry: &ArtifactEntry) -> ArtResult<ResolvedEntry> {
    let job_name = required(entry, entry.job.as_deref(), "job")?;
    let project = api.project(&entry.project)?;

    let mut pipeline_page = Some(1);
    while let Some(page) = pipeline_page {
        let pipelines = api.pipelines(&entry.project, &entry.git_ref, page)?;
        for pipeline in &pipelines.items {
            let mut job_page = Some(1);
            while let Some(page) = job_page {
                let jobs = api.pipeline_jobs(&entry.project, pipeline.id, page)?;
                if let Some(job) = jobs.items.iter().find(|job| job.name == job_name) {
                    debug!(
                        "{}: pipeline {} job {} ({})",
                        entry.project, pipeline.id, job.id, job.name
                    );
                    return Ok(ResolvedEntry::new(entry.clone(), job.id.to_string()));
                }
                job_page = jobs.next;
            }
        }
        pipeline_page = pipelines.next;
    }

    Err(ArtError::NotFound(format!(
        "Could not find latest successful '{}' job for {} ref {}",
        job_name, project.path_with_namespace, entry.git_ref
    )))
}

/// The commit a branch or tag points at
fn resolve_repository(api: &dyn GitlabApi, entry: &ArtifactEntry) -> ArtResult<ResolvedEntry> {
    let commit = api.branch_or_tag_commit(&entry.project, &entry.git_ref)?;
    let name = entry
        .project
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(&entry.project);

    let mut resolved = ResolvedEntry::new(entry.clone(), commit.id);
    resolved.archive_filename = Some(format!("{}-{}.zip", name, entry.git_ref.replace('/', "-")));
    Ok(resolved)
}

/// Exactly one package with this name and version, then its file by exact name
fn resolve_generic_package(
    api: &dyn GitlabApi,
    entry: &ArtifactEntry,
) -> ArtResult<ResolvedEntry> {
    let package_name = required(entry, entry.package.as_deref(), "package")?;
    let filename = required(entry, entry.filename.as_deref(), "filename")?;

    // The name filter is a substring match on the server side
    let candidates: Vec<_> = api
        .packages(&entry.project, package_name, &entry.git_ref)?
        .into_iter()
        .filter(|p| p.name == package_name && p.version == entry.git_ref)
        .collect();

    let package = match candidates.as_slice() {
        [one] => one,
        [] => {
            return Err(ArtError::NotFound(format!(
                "Could not find generic package '{}' version '{}' in {}",
                package_name, entry.git_ref, entry.project
            )))
        }
        many => {
            return Err(ArtError::AmbiguousPackage {
                project: entry.project.clone(),
                name: package_name.to_string(),
                version: entry.git_ref.clone(),
                count: many.len(),
            })
        }
    };

    let files = api.package_files(&entry.project, package.id)?;
    // Re-uploads keep older files with the same name; the newest has the highest id
    let file = files
        .iter()
        .filter(|f| f.file_name == filename)
        .max_by_key(|f| f.id)
        .ok_or_else(|| {
            ArtError::NotFound(format!(
                "Package '{}' version '{}' in {} has no file named '{}'",
                package_name, entry.git_ref, entry.project, filename
            ))
        })?;

    let mut resolved = ResolvedEntry::new(entry.clone(), file.id.to_string());
    resolved.archive_filename = Some(file.file_name.clone());
    resolved.sha256 = file.file_sha256.clone();
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::fake::FakeGitlab;
    use crate::gitlab::{Job, Package, PackageFile, Pipeline};
    use indexmap::IndexMap;
    use std::io::Read;

    fn entry(source: SourceKind) -> ArtifactEntry {
        ArtifactEntry {
            project: "group/proj".into(),
            source,
            git_ref: "main".into(),
            job: Some("build".into()),
            package: Some("tools".into()),
            filename: Some("tools.zip".into()),
            extract: true,
            install: IndexMap::new(),
        }
    }

    fn pipeline(id: u64) -> Pipeline {
        Pipeline {
            id,
            git_ref: Some("main".into()),
            status: "success".into(),
        }
    }

    fn job(id: u64, name: &str) -> Job {
        Job {
            id,
            name: name.into(),
            status: "success".into(),
        }
    }

    fn package(id: u64, name: &str, version: &str) -> Package {
        Package {
            id,
            name: name.into(),
            version: version.into(),
            package_type: "generic".into(),
        }
    }

    fn package_file(id: u64, name: &str) -> PackageFile {
        PackageFile {
            id,
            file_name: name.into(),
            size: Some(3),
            file_sha256: Some(format!("sha-{}", id)),
        }
    }

    fn with_pipelines(fake: &mut FakeGitlab, ids: &[u64]) {
        fake.pipelines.insert(
            ("group/proj".into(), "main".into()),
            ids.iter().map(|id| pipeline(*id)).collect(),
        );
    }

    #[test]
    fn newest_pipeline_with_matching_job_wins() {
        let mut fake = FakeGitlab::new();
        with_pipelines(&mut fake, &[30, 20, 10]);
        fake.jobs.insert(30, vec![job(301, "test")]);
        fake.jobs.insert(20, vec![job(201, "lint"), job(202, "build")]);
        fake.jobs.insert(10, vec![job(101, "build")]);

        let resolved = resolve(&fake, &entry(SourceKind::CiJob)).unwrap();
        assert_eq!(resolved.resolved_id, "202");
        assert!(!fake.calls().iter().any(|c| c.starts_with("jobs group/proj 10")));
    }

    #[test]
    fn follows_pagination() {
        let mut fake = FakeGitlab::new();
        with_pipelines(&mut fake, &[50, 40, 30]);
        fake.jobs
            .insert(30, vec![job(1, "a"), job(2, "b"), job(3, "build")]);

        let resolved = resolve(&fake, &entry(SourceKind::CiJob)).unwrap();
        assert_eq!(resolved.resolved_id, "3");
        let calls = fake.calls();
        assert!(calls.contains(&"pipelines group/proj main 2".to_string()));
        assert!(calls.contains(&"jobs group/proj 30 2".to_string()));
    }

    #[test]
    fn missing_job_is_not_found() {
        let mut fake = FakeGitlab::new();
        with_pipelines(&mut fake, &[2, 1]);
        fake.jobs.insert(2, vec![job(21, "test")]);

        let err = resolve(&fake, &entry(SourceKind::CiJob)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find latest successful 'build' job for group/proj ref main"
        );
    }

    #[test]
    fn repository_pins_commit() {
        let mut fake = FakeGitlab::new();
        fake.commits
            .insert(("group/proj".into(), "main".into()), "abc123".into());

        let resolved = resolve(&fake, &entry(SourceKind::Repository)).unwrap();
        assert_eq!(resolved.resolved_id, "abc123");
        assert_eq!(resolved.archive_filename.as_deref(), Some("proj-main.zip"));
    }

    #[test]
    fn generic_package_resolves_file() {
        let mut fake = FakeGitlab::new();
        fake.packages = vec![
            package(7, "tools", "main"),
            package(8, "tools-extra", "main"),
        ];
        fake.package_files.insert(
            7,
            vec![
                package_file(70, "tools.zip"),
                package_file(72, "tools.zip"),
                package_file(71, "other.zip"),
            ],
        );

        let resolved = resolve(&fake, &entry(SourceKind::GenericPackage)).unwrap();
        assert_eq!(resolved.resolved_id, "72");
        assert_eq!(resolved.archive_filename.as_deref(), Some("tools.zip"));
        assert_eq!(resolved.sha256.as_deref(), Some("sha-72"));
    }

    #[test]
    fn generic_package_ambiguity_is_an_error() {
        let mut fake = FakeGitlab::new();
        fake.packages = vec![package(7, "tools", "main"), package(9, "tools", "main")];

        let err = resolve(&fake, &entry(SourceKind::GenericPackage)).unwrap_err();
        assert!(matches!(err, ArtError::AmbiguousPackage { count: 2, .. }));
        assert!(!fake.calls().iter().any(|c| c.starts_with("package_files")));
    }

    #[test]
    fn generic_package_missing() {
        let fake = FakeGitlab::new();
        let err = resolve(&fake, &entry(SourceKind::GenericPackage)).unwrap_err();
        assert!(matches!(err, ArtError::NotFound(_)));
    }

    #[test]
    fn download_dispatches_on_source() {
        let mut fake = FakeGitlab::new();
        fake.downloads
            .insert("repo:group/proj:abc".into(), b"zip".to_vec());

        let resolved = ResolvedEntry::new(entry(SourceKind::Repository), "abc");
        let mut body = String::new();
        download(&fake, &resolved)
            .unwrap()
            .reader
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "zip");
    }
}
