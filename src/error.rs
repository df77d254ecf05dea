//! # Error Handling
//!
//! This module defines the centralized error type for `gitops-preview`. It
//! uses `thiserror` to build a single `Error` enum covering every failure an
//! action can hit, with enough context in each variant to explain the failure
//! in a CI log.
//!
//! ## Error classes
//!
//! Errors fall into three classes, and callers treat them differently:
//!
//! - **Recoverable manifest errors**: a single manifest is malformed. These
//!   are `manifest::ManifestError`, not variants here, because the reconciler
//!   always logs and skips them.
//! - **Retryable errors** (`PushRejected`, transient `GitHubApi` failures):
//!   the remote moved or hiccuped. The retry driver restarts the whole cycle.
//!   [`Error::is_retryable`] is the single place that classification lives.
//! - **Fatal errors** (everything else): a naming contract was violated, an
//!   input is missing, or a command failed outright. These propagate to the
//!   process boundary and fail the CI job.
//!
//! The `Result` alias is used throughout the library.

use thiserror::Error;

/// Main error type for gitops-preview operations
#[derive(Error, Debug)]
pub enum Error {
    /// A file name violates the `{prefix}--{service}` naming contract.
    ///
    /// Manifest file names are produced by these actions themselves, so a
    /// mismatch means the branch layout is broken rather than that the user
    /// made a typo.
    #[error("Naming contract violated by {path}: {message}")]
    NamingContract { path: String, message: String },

    /// A required action input was not supplied.
    #[error("Missing required input: {input}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    MissingInput {
        input: String,
        /// Optional hint for how to supply the input
        hint: Option<String>,
    },

    /// An action input was supplied but could not be interpreted.
    #[error("Invalid input {input}: {message}")]
    InvalidInput { input: String, message: String },

    /// A git subprocess exited unsuccessfully.
    #[error("Git command failed in {directory}: git {command} - {stderr}")]
    GitCommand {
        command: String,
        directory: String,
        stderr: String,
    },

    /// A fast-forward push was rejected because the branch moved.
    ///
    /// This is the only git failure the retry driver treats as retryable.
    #[error("Push to {branch} was rejected: {stderr}")]
    PushRejected { branch: String, stderr: String },

    /// A retryable operation did not succeed within its attempt budget.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<Error> },

    /// A GitHub REST API call failed.
    ///
    /// `status` is `None` when the request never produced an HTTP response.
    #[error("GitHub API error: {method} {url}{} - {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    GitHubApi {
        method: String,
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A filesystem operation on a working tree failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML serialization error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if restarting the operation may succeed.
    ///
    /// Push rejections mean another job updated the branch first. GitHub API
    /// failures are retryable when the server erred (5xx), throttled (429), or
    /// no response arrived at all.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::PushRejected { .. } => true,
            Error::GitHubApi { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
