//! Thin wrappers around the system `git` command
//!
//! Only the exit status of a git command is interpreted. Standard output is
//! returned for the few commands whose output matters (`status --porcelain`),
//! and standard error is kept for error messages and logs.

use std::fmt;
use std::path::Path;
use std::process::{Command, Output};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::debug;

use crate::error::{Error, Result};

const COMMITTER_NAME: &str = "github-actions";
const COMMITTER_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// A token used to authenticate git over HTTPS.
///
/// The token is handed to git through configuration environment variables, so
/// it never appears in a command line, in `.git/config`, or in logs.
#[derive(Clone)]
pub struct Credentials {
    server_url: String,
    token: String,
}

impl Credentials {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// The `http.<url>.extraheader` configuration key and value.
    fn extra_header(&self) -> (String, String) {
        let basic = BASE64.encode(format!("x-access-token:{}", self.token));
        (
            format!("http.{}/.extraheader", self.server_url),
            format!("AUTHORIZATION: basic {}", basic),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("token", &"***")
            .finish()
    }
}

/// Result of a fast-forward push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    /// The remote refused the update, usually because the branch moved.
    Rejected { stderr: String },
}

fn command(dir: &Path, args: &[&str], credentials: Option<&Credentials>) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_AUTHOR_NAME", COMMITTER_NAME)
        .env("GIT_AUTHOR_EMAIL", COMMITTER_EMAIL)
        .env("GIT_COMMITTER_NAME", COMMITTER_NAME)
        .env("GIT_COMMITTER_EMAIL", COMMITTER_EMAIL);
    if let Some(credentials) = credentials {
        let (key, value) = credentials.extra_header();
        cmd.env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", key)
            .env("GIT_CONFIG_VALUE_0", value);
    }
    cmd
}

fn output(dir: &Path, args: &[&str], credentials: Option<&Credentials>) -> Result<Output> {
    debug!("git {} (in {})", args.join(" "), dir.display());
    command(dir, args, credentials)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            directory: dir.display().to_string(),
            stderr: e.to_string(),
        })
}

/// Run git and fail unless it exits successfully, returning its stdout.
fn run(dir: &Path, args: &[&str], credentials: Option<&Credentials>) -> Result<String> {
    let out = output(dir, args, credentials)?;
    if !out.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            directory: dir.display().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Initialize an empty repository in `dir` with `origin` pointing at `url`.
pub fn init(dir: &Path, url: &str) -> Result<()> {
    run(dir, &["init", "--quiet"], None)?;
    run(dir, &["remote", "add", "origin", url], None)?;
    Ok(())
}

/// Check whether `branch` exists on `origin`.
pub fn remote_branch_exists(
    dir: &Path,
    branch: &str,
    credentials: Option<&Credentials>,
) -> Result<bool> {
    let full_name = format!("refs/heads/{}", branch);
    let args = ["ls-remote", "--exit-code", "origin", full_name.as_str()];
    let out = output(dir, &args, credentials)?;
    match out.status.code() {
        // ls-remote patterns match on trailing path components, so compare
        // the listed names exactly
        Some(0) => Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .any(|name| name == full_name)),
        // ls-remote --exit-code exits with 2 when no ref matched
        Some(2) => Ok(false),
        _ => Err(Error::GitCommand {
            command: args.join(" "),
            directory: dir.display().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        }),
    }
}

/// Shallow-fetch `branch` from `origin` and check it out.
pub fn fetch_and_checkout(dir: &Path, branch: &str, credentials: Option<&Credentials>) -> Result<()> {
    let refspec = format!("refs/heads/{0}:refs/remotes/origin/{0}", branch);
    run(
        dir,
        &["fetch", "--quiet", "--no-tags", "--depth=1", "origin", &refspec],
        credentials,
    )?;
    let remote_ref = format!("origin/{}", branch);
    run(dir, &["checkout", "--quiet", "-B", branch, &remote_ref], None)?;
    Ok(())
}

/// Point `HEAD` at a branch with no commits yet.
pub fn start_orphan_branch(dir: &Path, branch: &str) -> Result<()> {
    let head = format!("refs/heads/{}", branch);
    run(dir, &["symbolic-ref", "HEAD", &head], None)?;
    Ok(())
}

/// Whether the working tree differs from `HEAD`, including untracked files.
pub fn has_changes(dir: &Path) -> Result<bool> {
    let status = run(dir, &["status", "--porcelain"], None)?;
    Ok(!status.trim().is_empty())
}

/// Stage everything, including deletions, and commit.
pub fn commit_all(dir: &Path, message: &str) -> Result<()> {
    run(dir, &["add", "--all", "."], None)?;
    run(dir, &["commit", "--quiet", "-m", message], None)?;
    Ok(())
}

/// Push `HEAD` to `branch` without force, so only fast-forwards succeed.
///
/// A non-zero exit is reported as [`PushStatus::Rejected`] rather than an
/// error; deciding whether to retry is the caller's job.
pub fn push(dir: &Path, branch: &str, credentials: Option<&Credentials>) -> Result<PushStatus> {
    let refspec = format!("HEAD:refs/heads/{}", branch);
    let out = output(dir, &["push", "--quiet", "origin", &refspec], credentials)?;
    if out.status.success() {
        Ok(PushStatus::Pushed)
    } else {
        Ok(PushStatus::Rejected {
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        })
    }
}
