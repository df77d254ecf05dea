//! Process-wide action context
//!
//! The runner environment (server URLs, token, repository) is read once by
//! the command layer and carried in an `ActionContext`. Nothing below the
//! command layer looks at environment variables.

use crate::error::{Error, Result};
use crate::git::Credentials;
use crate::github::GitHubClient;
use crate::namespace::repository_name;
use std::fmt;

#[derive(Clone)]
pub struct ActionContext {
    /// Base URL of the git server, such as `https://github.com`.
    pub server_url: String,
    /// Base URL of the REST API, such as `https://api.github.com`.
    pub api_url: String,
    /// `owner/name` of the repository whose workflow is running.
    pub repository: String,
    token: Option<String>,
}

impl ActionContext {
    pub fn new(
        server_url: impl Into<String>,
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let context = Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_url: api_url.into(),
            repository: repository.into(),
            token: token.filter(|t| !t.is_empty()),
        };
        repository_name(&context.repository)?;
        Ok(context)
    }

    /// Name of the running repository without its owner.
    pub fn repository_name(&self) -> &str {
        // Validated in `new`
        repository_name(&self.repository).unwrap_or(&self.repository)
    }

    /// Clone URL of `repository` on the configured server.
    pub fn repository_url(&self, repository: &str) -> String {
        format!("{}/{}.git", self.server_url, repository)
    }

    /// Git credentials, when a token was supplied.
    pub fn credentials(&self) -> Option<Credentials> {
        self.token
            .as_ref()
            .map(|token| Credentials::new(self.server_url.clone(), token.clone()))
    }

    pub fn github_client(&self) -> Result<GitHubClient> {
        if self.token.is_none() {
            return Err(Error::MissingInput {
                input: "token".to_string(),
                hint: Some("Set GITHUB_TOKEN or pass --token".to_string()),
            });
        }
        GitHubClient::new(&self.api_url, self.token.clone())
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("server_url", &self.server_url)
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
