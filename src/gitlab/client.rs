//! ureq-backed GitLab REST client

use super::{
    encode_segment, Commit, Download, GitlabApi, Job, Package, PackageFile, Page, Pipeline,
    Project,
};
use crate::config::{Config, ConfigManager, TokenType};
use crate::error::{ArtError, ArtResult};
use crate::gitlab::oauth::{self, DeviceAuthorization};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::http::Response;
use ureq::{Agent, Body};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const API_TIMEOUT: Duration = Duration::from_secs(60);
const READ_TIMEOUT: Duration = Duration::from_secs(15);
const PER_PAGE: &str = "100";

/// Blocking GitLab client authenticated by one token
pub struct GitlabClient {
    base_url: String,
    api_url: String,
    token_type: TokenType,
    token: String,
    api: Agent,
    downloads: Agent,
}

impl GitlabClient {
    /// Create a client for `config` without contacting the server
    pub fn new(config: &Config) -> Self {
        let api_config = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_global(Some(API_TIMEOUT))
            .build();
        let download_config = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(READ_TIMEOUT))
            .build();

        Self {
            base_url: config.gitlab_url.clone(),
            api_url: format!("{}/api/v4", config.gitlab_url.trim_end_matches('/')),
            token_type: config.token_type,
            token: config.token.clone(),
            api: Agent::new_with_config(api_config),
            downloads: Agent::new_with_config(download_config),
        }
    }

    /// Create a client, refreshing an expired OAuth token first
    ///
    /// OAuth access tokens are short-lived. When the stored one is rejected the
    /// refresh token is exchanged for a new pair (or a new device authorization
    /// is started) and the result is saved back through `manager`.
    pub fn connect(
        manager: &ConfigManager,
        mut config: Config,
        prompt: &dyn Fn(&DeviceAuthorization),
    ) -> ArtResult<Self> {
        let client = Self::new(&config);
        if config.token_type != TokenType::Oauth || client.auth_check()? {
            return Ok(client);
        }

        info!("OAuth token rejected, refreshing");
        let client_id = config
            .oauth_client_id
            .clone()
            .ok_or_else(|| ArtError::config("oauth_client_id", "Required for oauth tokens"))?;
        let tokens = oauth::refresh(
            &config.gitlab_url,
            &client_id,
            config.refresh_token.as_deref(),
            prompt,
        )?;

        config.token = tokens.access_token;
        config.refresh_token = Some(tokens.refresh_token);
        manager.save(&config)?;
        Ok(Self::new(&config))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn project_path(project: &str) -> String {
        format!("/projects/{}", encode_segment(project))
    }

    fn auth_header(&self) -> (&'static str, String) {
        match self.token_type {
            TokenType::Private => ("PRIVATE-TOKEN", self.token.clone()),
            TokenType::Job => ("JOB-TOKEN", self.token.clone()),
            TokenType::Oauth => ("Authorization", format!("Bearer {}", self.token)),
        }
    }

    fn get(
        &self,
        agent: &Agent,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> ArtResult<Response<Body>> {
        let url = self.url(path);
        debug!("GET {}", url);
        let (name, value) = self.auth_header();
        let mut request = agent.get(&url).header(name, &value);
        for (k, v) in query {
            request = request.query(*k, *v);
        }
        request.call().map_err(|e| self.map_error(e, context))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> ArtResult<(T, Option<u32>)> {
        let mut response = self.get(&self.api, path, query, context)?;
        let next = response
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ArtError::network(context, e))?;
        let value = serde_json::from_str(&text)?;
        Ok((value, next))
    }

    fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> ArtResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let page_str = page.to_string();
            let mut paged: Vec<(&str, &str)> = query.to_vec();
            paged.push(("page", &page_str));
            paged.push(("per_page", PER_PAGE));

            let (batch, next): (Vec<T>, _) = self.get_json(path, &paged, context)?;
            items.extend(batch);
            match next {
                Some(n) if n > page => page = n,
                _ => return Ok(items),
            }
        }
    }

    fn download(&self, path: &str, query: &[(&str, &str)], context: &str) -> ArtResult<Download> {
        let response = self.get(&self.downloads, path, query, context)?;
        let length = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        Ok(Download {
            reader: Box::new(response.into_body().into_reader()),
            length,
        })
    }

    fn map_error(&self, err: ureq::Error, context: &str) -> ArtError {
        match err {
            ureq::Error::StatusCode(code @ (401 | 403)) => ArtError::Authentication {
                url: self.base_url.clone(),
                reason: format!("{}: HTTP {}", context, code),
            },
            ureq::Error::StatusCode(404) => ArtError::NotFound(format!("{}: 404 Not Found", context)),
            ureq::Error::StatusCode(code) => {
                ArtError::network(context, format!("HTTP {}", code))
            }
            other => {
                warn!("Request to {} failed: {}", self.base_url, other);
                ArtError::network(
                    context,
                    format!("Connection to {} failed: {}", self.base_url, other),
                )
            }
        }
    }
}

impl GitlabApi for GitlabClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn project(&self, project: &str) -> ArtResult<Project> {
        let context = format!("Failed to look up project {}", project);
        let (value, _) = self.get_json(&Self::project_path(project), &[], &context)?;
        Ok(value)
    }

    fn pipelines(&self, project: &str, git_ref: &str, page: u32) -> ArtResult<Page<Pipeline>> {
        let context = format!("Failed to list pipelines of {} ref {}", project, git_ref);
        let page_str = page.to_string();
        let (items, next) = self.get_json(
            &format!("{}/pipelines", Self::project_path(project)),
            &[
                ("ref", git_ref),
                ("order_by", "id"),
                ("sort", "desc"),
                ("page", &page_str),
                ("per_page", PER_PAGE),
            ],
            &context,
        )?;
        Ok(Page { items, next })
    }

    fn pipeline_jobs(&self, project: &str, pipeline_id: u64, page: u32) -> ArtResult<Page<Job>> {
        let context = format!("Failed to list jobs of pipeline {} in {}", pipeline_id, project);
        let page_str = page.to_string();
        let (items, next) = self.get_json(
            &format!("{}/pipelines/{}/jobs", Self::project_path(project), pipeline_id),
            &[("scope", "success"), ("page", &page_str), ("per_page", PER_PAGE)],
            &context,
        )?;
        Ok(Page { items, next })
    }

    fn branch_or_tag_commit(&self, project: &str, git_ref: &str) -> ArtResult<Commit> {
        let context = format!("Failed to resolve ref {} of {}", git_ref, project);
        let (value, _) = self.get_json(
            &format!(
                "{}/repository/commits/{}",
                Self::project_path(project),
                encode_segment(git_ref)
            ),
            &[],
            &context,
        )?;
        Ok(value)
    }

    fn packages(&self, project: &str, name: &str, version: &str) -> ArtResult<Vec<Package>> {
        let context = format!("Failed to list packages of {}", project);
        self.get_all(
            &format!("{}/packages", Self::project_path(project)),
            &[
                ("package_type", "generic"),
                ("package_name", name),
                ("package_version", version),
            ],
            &context,
        )
    }

    fn package_files(&self, project: &str, package_id: u64) -> ArtResult<Vec<PackageFile>> {
        let context = format!("Failed to list files of package {} in {}", package_id, project);
        self.get_all(
            &format!(
                "{}/packages/{}/package_files",
                Self::project_path(project),
                package_id
            ),
            &[],
            &context,
        )
    }

    fn job_artifacts(&self, project: &str, job_id: &str) -> ArtResult<Download> {
        let context = format!("Failed to download job {} artifacts from {}", job_id, project);
        self.download(
            &format!(
                "{}/jobs/{}/artifacts",
                Self::project_path(project),
                encode_segment(job_id)
            ),
            &[],
            &context,
        )
    }

    fn repository_archive(&self, project: &str, sha: &str) -> ArtResult<Download> {
        let context = format!("Failed to download repository archive {} of {}", sha, project);
        self.download(
            &format!("{}/repository/archive.zip", Self::project_path(project)),
            &[("sha", sha)],
            &context,
        )
    }

    fn package_file(
        &self,
        project: &str,
        package: &str,
        version: &str,
        filename: &str,
    ) -> ArtResult<Download> {
        let context = format!(
            "Failed to download {} from package {} {} of {}",
            filename, package, version, project
        );
        self.download(
            &format!(
                "{}/packages/generic/{}/{}/{}",
                Self::project_path(project),
                encode_segment(package),
                encode_segment(version),
                encode_segment(filename)
            ),
            &[],
            &context,
        )
    }

    fn auth_check(&self) -> ArtResult<bool> {
        match self.get(&self.api, "/user", &[], "Authentication failed") {
            Ok(_) => Ok(true),
            Err(ArtError::Authentication { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token_type: TokenType) -> GitlabClient {
        GitlabClient::new(&Config::with_token(
            "https://gitlab.example.com/",
            token_type,
            "secret",
        ))
    }

    #[test]
    fn api_url_has_single_slash() {
        let c = client(TokenType::Private);
        assert_eq!(c.url("/user"), "https://gitlab.example.com/api/v4/user");
        assert_eq!(
            GitlabClient::project_path("group/proj"),
            "/projects/group%2Fproj"
        );
    }

    #[test]
    fn auth_header_per_token_type() {
        assert_eq!(
            client(TokenType::Private).auth_header(),
            ("PRIVATE-TOKEN", "secret".to_string())
        );
        assert_eq!(
            client(TokenType::Job).auth_header(),
            ("JOB-TOKEN", "secret".to_string())
        );
        assert_eq!(
            client(TokenType::Oauth).auth_header(),
            ("Authorization", "Bearer secret".to_string())
        );
    }

    #[test]
    fn status_codes_mapped() {
        let c = client(TokenType::Private);
        assert!(matches!(
            c.map_error(ureq::Error::StatusCode(401), "ctx"),
            ArtError::Authentication { .. }
        ));
        assert!(matches!(
            c.map_error(ureq::Error::StatusCode(404), "ctx"),
            ArtError::NotFound(_)
        ));
        let err = c.map_error(ureq::Error::StatusCode(500), "ctx");
        assert_eq!(err.to_string(), "ctx: HTTP 500");
    }
}
