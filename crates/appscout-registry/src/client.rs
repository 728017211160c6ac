//! HTTP client for the GitHub REST API and raw file endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::{RegistryConfig, RegistryError, RepoRef};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// One item of the org repository listing. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoListing {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// Client for the code-hosting service.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    config: Arc<RegistryConfig>,
}

impl GithubClient {
    /// Create a new client for the given configuration.
    pub fn new(config: Arc<RegistryConfig>) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { http, config })
    }

    /// Get the configuration this client was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Fetch one page (1-based) of the configured org's repository listing.
    ///
    /// A 403 is reported as [`RegistryError::RateLimited`]; any other
    /// non-success status as [`RegistryError::Status`].
    pub async fn list_repos_page(&self, page: usize) -> Result<Vec<RepoListing>, RegistryError> {
        let url = format!("{}/orgs/{}/repos", self.config.api_base_url, self.config.org);

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .query(&[
                ("per_page", self.config.per_page.to_string()),
                ("page", page.to_string()),
            ]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RegistryError::RateLimited { endpoint: url });
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let repos: Vec<RepoListing> = serde_json::from_str(&body)?;
        debug!(page, count = repos.len(), org = %self.config.org, "fetched repo listing page");
        Ok(repos)
    }

    /// Fetch a raw file from a repository branch.
    ///
    /// Non-success responses mean "not there" and yield `Ok(None)`; only
    /// transport failures are errors.
    pub async fn fetch_raw(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, RegistryError> {
        let url = self.raw_url(repo, branch, path);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            trace!(url = %url, status = %response.status(), "raw file not found");
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }

    fn raw_url(&self, repo: &RepoRef, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_base_url, repo.org, repo.name, branch, path
        )
    }
}
