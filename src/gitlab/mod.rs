//! GitLab API access
//!
//! `GitlabApi` is the seam between artifact resolution and the network:
//! the resolver and the workflows only see this trait, the ureq-backed
//! `GitlabClient` implements it for real servers.

pub mod client;
pub mod oauth;

pub use client::GitlabClient;

use crate::error::{ArtError, ArtResult};
use serde::Deserialize;
use std::io::Read;

/// A project as returned by `/projects/:id`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path: String,
    pub path_with_namespace: String,
}

/// A pipeline as returned by `/projects/:id/pipelines`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// A job as returned by `/projects/:id/pipelines/:id/jobs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// A commit as returned by `/projects/:id/repository/commits/:ref`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Commit {
    pub id: String,
}

/// A package as returned by `/projects/:id/packages`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Package {
    pub id: u64,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub package_type: String,
}

/// A file of a package as returned by `/projects/:id/packages/:id/package_files`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageFile {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub file_sha256: Option<String>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, when there is one
    pub next: Option<u32>,
}

impl<T> Page<T> {
    /// The only page
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// A streamed download
pub struct Download {
    pub reader: Box<dyn Read>,
    /// Byte count announced by the server
    pub length: Option<u64>,
}

/// Operations art needs from a GitLab server
pub trait GitlabApi {
    /// Base URL of the server, for messages
    fn base_url(&self) -> &str;

    /// Look up a project by its full path
    fn project(&self, project: &str) -> ArtResult<Project>;

    /// Pipelines for `git_ref`, newest (highest id) first
    fn pipelines(&self, project: &str, git_ref: &str, page: u32) -> ArtResult<Page<Pipeline>>;

    /// Successful jobs of one pipeline
    fn pipeline_jobs(&self, project: &str, pipeline_id: u64, page: u32) -> ArtResult<Page<Job>>;

    /// Commit a branch or tag currently points to
    fn branch_or_tag_commit(&self, project: &str, git_ref: &str) -> ArtResult<Commit>;

    /// Generic packages matching `name` and `version`
    fn packages(&self, project: &str, name: &str, version: &str) -> ArtResult<Vec<Package>>;

    /// Files of one package
    fn package_files(&self, project: &str, package_id: u64) -> ArtResult<Vec<PackageFile>>;

    /// Artifacts archive of a job
    fn job_artifacts(&self, project: &str, job_id: &str) -> ArtResult<Download>;

    /// Zip archive of the repository at a commit
    fn repository_archive(&self, project: &str, sha: &str) -> ArtResult<Download>;

    /// One file of a generic package
    fn package_file(
        &self,
        project: &str,
        package: &str,
        version: &str,
        filename: &str,
    ) -> ArtResult<Download>;

    /// Whether the configured token is accepted
    fn auth_check(&self) -> ArtResult<bool>;
}

type ApiFactory<'a> = Box<dyn FnOnce() -> ArtResult<Box<dyn GitlabApi>> + 'a>;

enum ApiState<'a> {
    Pending(ApiFactory<'a>),
    Owned(Box<dyn GitlabApi>),
    Borrowed(&'a dyn GitlabApi),
    Failed,
}

/// A client created on first use
///
/// Commands that may run entirely from the cache only pay for loading the
/// configuration and authenticating when a download is actually needed.
pub struct LazyApi<'a> {
    state: ApiState<'a>,
}

impl<'a> LazyApi<'a> {
    /// Defer client creation to `factory`
    pub fn new(factory: impl FnOnce() -> ArtResult<Box<dyn GitlabApi>> + 'a) -> Self {
        Self {
            state: ApiState::Pending(Box::new(factory)),
        }
    }

    /// Use an existing client
    pub fn borrowed(api: &'a dyn GitlabApi) -> Self {
        Self {
            state: ApiState::Borrowed(api),
        }
    }

    /// Whether the client has been created
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ApiState::Owned(_) | ApiState::Borrowed(_))
    }

    /// The client, creating it if needed
    pub fn get(&mut self) -> ArtResult<&dyn GitlabApi> {
        if matches!(self.state, ApiState::Pending(_)) {
            if let ApiState::Pending(factory) = std::mem::replace(&mut self.state, ApiState::Failed)
            {
                self.state = ApiState::Owned(factory()?);
            }
        }
        match &self.state {
            ApiState::Owned(api) => Ok(api.as_ref()),
            ApiState::Borrowed(api) => Ok(*api),
            _ => Err(ArtError::Internal(
                "GitLab client unavailable after an earlier failure".into(),
            )),
        }
    }
}

/// Percent-encode one URL path segment
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
