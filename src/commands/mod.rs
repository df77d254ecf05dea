//! # CLI Command Implementations
//!
//! This module contains one subcommand per workflow action. Each subcommand
//! is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the action inputs, derived using `clap`.
//!   Every input can be given as a flag or through the `INPUT_<NAME>`
//!   environment variable the workflow runner sets.
//! - An `execute` function that validates the inputs, builds the
//!   [`ActionContext`] once, and calls into the `gitops_preview` library.
//!
//! Inputs are validated before any git or network work starts, so a
//! misconfigured workflow fails fast.

pub mod bootstrap_pull_request;
pub mod delete_closed_namespace_branches;
pub mod delete_namespace_branch;
pub mod git_push_service;

use anyhow::{Context, Result};
use clap::Args;
use gitops_preview::config::validate_segment;
use gitops_preview::context::ActionContext;
use gitops_preview::manifest::ApplicationContext;
use gitops_preview::output::ActionOutputs;
use gitops_preview::retry::RetryPolicy;
use std::path::PathBuf;

/// Runner environment shared by every command
#[derive(Args, Debug, Clone)]
pub struct GitHubArgs {
    /// Repository whose workflow is running, as owner/name
    #[arg(long, value_name = "OWNER/NAME", env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Git server base URL
    #[arg(
        long,
        value_name = "URL",
        env = "GITHUB_SERVER_URL",
        default_value = "https://github.com"
    )]
    pub server_url: String,

    /// REST API base URL
    #[arg(
        long,
        value_name = "URL",
        env = "GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    pub api_url: String,

    /// Token for git and the REST API
    #[arg(long, value_name = "TOKEN", env = "INPUT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File to append action outputs to
    #[arg(long, value_name = "PATH", env = "GITHUB_OUTPUT")]
    pub github_output: Option<PathBuf>,
}

impl GitHubArgs {
    /// Build the action context, falling back to `GITHUB_TOKEN` for the token.
    pub fn context(&self) -> Result<ActionContext> {
        let repository = self
            .repository
            .as_deref()
            .filter(|r| !r.is_empty())
            .context("Missing repository: pass --repository or set GITHUB_REPOSITORY")?;
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok());
        Ok(ActionContext::new(
            &self.server_url,
            &self.api_url,
            repository,
            token,
        )?)
    }

    pub fn write_outputs(&self, outputs: &ActionOutputs) -> Result<()> {
        outputs
            .write(self.github_output.as_deref())
            .context("Failed to write action outputs")
    }
}

/// Where the namespace lives
#[derive(Args, Debug, Clone)]
pub struct NamespaceArgs {
    /// Overlay name, such as `pr`
    #[arg(long, env = "INPUT_OVERLAY")]
    pub overlay: String,

    /// Namespace name, such as `pr-123`
    #[arg(long, env = "INPUT_NAMESPACE")]
    pub namespace: String,

    /// Repository holding the namespace branches, as owner/name
    #[arg(long, value_name = "OWNER/NAME", env = "INPUT_DESTINATION-REPOSITORY")]
    pub destination_repository: String,
}

impl NamespaceArgs {
    pub fn validate(&self) -> Result<()> {
        validate_segment("overlay", &self.overlay)?;
        validate_segment("namespace", &self.namespace)?;
        gitops_preview::namespace::repository_name(&self.destination_repository)?;
        Ok(())
    }

    pub fn application_context(&self, context: &ActionContext, project: &str) -> ApplicationContext {
        ApplicationContext {
            overlay: self.overlay.clone(),
            namespace: self.namespace.clone(),
            project: project.to_string(),
            destination_repository: self.destination_repository.clone(),
            source_repository_name: context.repository_name().to_string(),
            server_url: context.server_url.clone(),
        }
    }
}

/// Retry settings of the push loop
#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Maximum number of checkout-to-push cycles
    #[arg(long, value_name = "N", env = "INPUT_MAX-ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Upper bound of the random wait between cycles, in milliseconds
    #[arg(long, value_name = "MS", env = "INPUT_WAIT-MS")]
    pub wait_ms: Option<u64>,
}

impl RetryArgs {
    pub fn policy(
        &self,
        build: fn(u32, u64) -> RetryPolicy,
        default_attempts: u32,
        default_wait_ms: u64,
    ) -> Result<RetryPolicy> {
        let max_attempts = self.max_attempts.unwrap_or(default_attempts);
        if max_attempts == 0 {
            anyhow::bail!("Invalid max-attempts: must be at least 1");
        }
        Ok(build(max_attempts, self.wait_ms.unwrap_or(default_wait_ms)))
    }
}
