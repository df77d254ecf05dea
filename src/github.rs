//! Minimal GitHub REST API client
//!
//! Covers the endpoints the teardown actions need: listing and deleting git
//! refs, and listing open pull requests. Transient failures (no response,
//! 429, 5xx) are retried here, so callers only see errors worth reporting.

use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("gitops-preview/", env!("CARGO_PKG_VERSION"));

/// A git reference as returned by the refs endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRef {
    /// Fully qualified name, such as `refs/heads/main`.
    #[serde(rename = "ref")]
    pub name: String,
}

impl GitRef {
    /// The branch name, if this is a branch ref.
    pub fn branch(&self) -> Option<&str> {
        self.name.strip_prefix("refs/heads/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub state: String,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The resource was already gone.
    NotFound,
}

pub struct GitHubClient {
    api_url: String,
    token: Option<String>,
    agent: ureq::Agent,
    policy: RetryPolicy,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        // Validates the base URL once, up front
        url::Url::parse(api_url)?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .user_agent(USER_AGENT)
                .build(),
            policy: RetryPolicy::quadratic(3, 1000),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let request = self
            .agent
            .request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request, retrying transient failures.
    ///
    /// Every non-2xx status is an error, 404 included. GitHub also answers 404
    /// for private repositories the token cannot see, so absence is only
    /// meaningful to callers that asked for one specific resource.
    fn send(&self, method: &str, url: &str) -> Result<ureq::Response> {
        retry(&self.policy, |_| {
            debug!("{} {}", method, url);
            match self.request(method, url).call() {
                Ok(response) => Ok(response),
                Err(ureq::Error::Status(status, response)) => Err(Error::GitHubApi {
                    method: method.to_string(),
                    url: url.to_string(),
                    status: Some(status),
                    message: error_message(response),
                }),
                Err(ureq::Error::Transport(transport)) => Err(Error::GitHubApi {
                    method: method.to_string(),
                    url: url.to_string(),
                    status: None,
                    message: transport.to_string(),
                }),
            }
        })
    }

    /// GET every page of a list endpoint.
    fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in 1.. {
            let separator = if path.contains('?') { '&' } else { '?' };
            let url = self.url(&format!(
                "{}{}per_page={}&page={}",
                path, separator, PER_PAGE, page
            ));
            let response = self.send("GET", &url)?;
            let batch: Vec<T> = response.into_json().map_err(|e| Error::GitHubApi {
                method: "GET".to_string(),
                url: url.clone(),
                status: None,
                message: format!("invalid response body: {}", e),
            })?;
            let last_page = batch.len() < PER_PAGE;
            items.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(items)
    }
}

/// REST operations used by the teardown commands - allows mocking in tests
pub trait GitHubOperations {
    /// List refs whose name starts with `prefix` (for example `heads/ns/app/pr/`).
    fn list_matching_refs(&self, repository: &str, prefix: &str) -> Result<Vec<GitRef>>;

    /// Delete a ref such as `heads/ns/app/pr/pr-1`. A missing ref is not an error.
    fn delete_ref(&self, repository: &str, git_ref: &str) -> Result<DeleteOutcome>;

    /// List all open pull requests.
    fn list_open_pull_requests(&self, repository: &str) -> Result<Vec<PullRequest>>;
}

impl GitHubOperations for GitHubClient {
    fn list_matching_refs(&self, repository: &str, prefix: &str) -> Result<Vec<GitRef>> {
        self.get_all(&format!("repos/{}/git/matching-refs/{}", repository, prefix))
    }

    fn delete_ref(&self, repository: &str, git_ref: &str) -> Result<DeleteOutcome> {
        let url = self.url(&format!("repos/{}/git/refs/{}", repository, git_ref));
        match self.send("DELETE", &url) {
            Ok(_) => {
                info!("Deleted {} in {}", git_ref, repository);
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if is_missing_ref(&e) => {
                info!("{} in {} was already deleted", git_ref, repository);
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    fn list_open_pull_requests(&self, repository: &str) -> Result<Vec<PullRequest>> {
        self.get_all(&format!("repos/{}/pulls?state=open", repository))
    }
}

/// A DELETE of a ref that is already gone: 404, or 422 "Reference does not exist".
fn is_missing_ref(error: &Error) -> bool {
    match error {
        Error::GitHubApi {
            status: Some(404), ..
        } => true,
        Error::GitHubApi {
            status: Some(422),
            message,
            ..
        } => message.contains("Reference does not exist"),
        _ => false,
    }
}

fn error_message(response: ureq::Response) -> String {
    #[derive(Deserialize)]
    struct Body {
        message: String,
    }

    match response.into_string() {
        Ok(text) => serde_json::from_str::<Body>(&text)
            .map(|b| b.message)
            .unwrap_or(text),
        Err(e) => e.to_string(),
    }
}
