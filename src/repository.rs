//! # Branch Updates with Optimistic Concurrency
//!
//! This module provides the `BranchUpdater`, which applies a mutation to a
//! branch of the destination repository and pushes it, retrying when another
//! job pushed first. Each attempt runs the full cycle:
//!
//! ```text
//! CHECKOUT -> MUTATE -> COMMIT -> PUSH -> SUCCESS
//!                                      -> rejected: back to CHECKOUT
//! ```
//!
//! Every attempt starts from a fresh temporary working tree, so a half-applied
//! mutation from a failed attempt can never leak into the next one. The push
//! is never forced; git's atomic ref update at the remote is the only
//! concurrency control.
//!
//! ## Design
//!
//! Git access goes through the **`GitOperations`** trait. The application
//! uses `DefaultGitOperations`, which shells out to the `git` command, and
//! tests substitute mocks to script rejections without a remote.

use crate::error::{Error, Result};
use crate::git::{self, Credentials, PushStatus};
use crate::retry::{retry_with_sleep, RetryPolicy};
use log::info;
use std::path::Path;
use std::time::Duration;

/// Trait for git operations - allows mocking in tests
pub trait GitOperations {
    /// Check out `branch` into the empty directory `dir`.
    ///
    /// A branch that does not exist on the remote yet is started empty.
    /// Returns whether the branch existed.
    fn checkout(&self, branch: &str, dir: &Path) -> Result<bool>;

    /// Whether the working tree has anything to commit.
    fn has_changes(&self, dir: &Path) -> Result<bool>;

    /// Stage and commit everything in the working tree.
    fn commit(&self, dir: &Path, message: &str) -> Result<()>;

    /// Fast-forward push of the working tree's `HEAD` to `branch`.
    fn push(&self, dir: &Path, branch: &str) -> Result<PushStatus>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command against one remote repository.
#[derive(Debug, Clone)]
pub struct DefaultGitOperations {
    repository_url: String,
    credentials: Option<Credentials>,
}

impl DefaultGitOperations {
    pub fn new(repository_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            repository_url: repository_url.into(),
            credentials,
        }
    }
}

impl GitOperations for DefaultGitOperations {
    fn checkout(&self, branch: &str, dir: &Path) -> Result<bool> {
        let credentials = self.credentials.as_ref();
        git::init(dir, &self.repository_url)?;
        if git::remote_branch_exists(dir, branch, credentials)? {
            git::fetch_and_checkout(dir, branch, credentials)?;
            Ok(true)
        } else {
            info!("Branch {} does not exist yet; starting it empty", branch);
            git::start_orphan_branch(dir, branch)?;
            Ok(false)
        }
    }

    fn has_changes(&self, dir: &Path) -> Result<bool> {
        git::has_changes(dir)
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<()> {
        git::commit_all(dir, message)
    }

    fn push(&self, dir: &Path, branch: &str) -> Result<PushStatus> {
        git::push(dir, branch, self.credentials.as_ref())
    }
}

/// What the final attempt did to the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A commit was pushed.
    Pushed,
    /// The mutation left the branch unchanged.
    NothingToCommit,
}

/// Result of a successful `BranchUpdater::update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult<T> {
    pub outcome: UpdateOutcome,
    /// Number of checkout-to-push cycles it took.
    pub attempts: u32,
    /// Value returned by the mutation of the final attempt.
    pub value: T,
}

/// Applies mutations to branches, retrying on rejected pushes.
pub struct BranchUpdater<'a> {
    git_ops: &'a dyn GitOperations,
    policy: RetryPolicy,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> BranchUpdater<'a> {
    pub fn new(git_ops: &'a dyn GitOperations, policy: RetryPolicy) -> Self {
        Self {
            git_ops,
            policy,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleep between attempts. Used by tests.
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Check out `branch`, run `mutate` on the working tree, then commit and
    /// push with `message`.
    ///
    /// `mutate` runs once per attempt, always on a fresh checkout.
    pub fn update<T, F>(&self, branch: &str, message: &str, mut mutate: F) -> Result<UpdateResult<T>>
    where
        F: FnMut(&Path) -> Result<T>,
    {
        retry_with_sleep(
            &self.policy,
            |delay| (self.sleep)(delay),
            |attempt| {
                let workspace = tempfile::Builder::new()
                    .prefix("gitops-preview-")
                    .tempdir()
                    .map_err(|e| Error::Filesystem {
                        message: format!("Failed to create a working tree: {}", e),
                    })?;
                let dir = workspace.path();

                self.git_ops.checkout(branch, dir)?;
                let value = mutate(dir)?;

                if !self.git_ops.has_changes(dir)? {
                    info!("Nothing to commit on {}", branch);
                    return Ok(UpdateResult {
                        outcome: UpdateOutcome::NothingToCommit,
                        attempts: attempt,
                        value,
                    });
                }

                self.git_ops.commit(dir, message)?;
                match self.git_ops.push(dir, branch)? {
                    PushStatus::Pushed => {
                        info!("Pushed {} (attempt {})", branch, attempt);
                        Ok(UpdateResult {
                            outcome: UpdateOutcome::Pushed,
                            attempts: attempt,
                            value,
                        })
                    }
                    PushStatus::Rejected { stderr } => Err(Error::PushRejected {
                        branch: branch.to_string(),
                        stderr,
                    }),
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::path::PathBuf;

    /// Mock git operations that reject a scripted number of pushes
    struct MockGitOperations {
        rejections: Cell<u32>,
        changes: bool,
        checkouts: RefCell<Vec<PathBuf>>,
        commits: Cell<u32>,
        pushes: Cell<u32>,
    }

    impl MockGitOperations {
        fn rejecting(rejections: u32) -> Self {
            Self {
                rejections: Cell::new(rejections),
                changes: true,
                checkouts: RefCell::new(Vec::new()),
                commits: Cell::new(0),
                pushes: Cell::new(0),
            }
        }

        fn without_changes() -> Self {
            Self {
                changes: false,
                ..Self::rejecting(0)
            }
        }
    }

    impl GitOperations for MockGitOperations {
        fn checkout(&self, _branch: &str, dir: &Path) -> Result<bool> {
            self.checkouts.borrow_mut().push(dir.to_path_buf());
            fs::write(dir.join("existing.yaml"), "from remote")?;
            Ok(true)
        }

        fn has_changes(&self, _dir: &Path) -> Result<bool> {
            Ok(self.changes)
        }

        fn commit(&self, _dir: &Path, _message: &str) -> Result<()> {
            self.commits.set(self.commits.get() + 1);
            Ok(())
        }

        fn push(&self, _dir: &Path, _branch: &str) -> Result<PushStatus> {
            self.pushes.set(self.pushes.get() + 1);
            if self.rejections.get() > 0 {
                self.rejections.set(self.rejections.get() - 1);
                Ok(PushStatus::Rejected {
                    stderr: "! [rejected] main -> main (fetch first)".to_string(),
                })
            } else {
                Ok(PushStatus::Pushed)
            }
        }
    }

    #[test]
    fn test_update_retries_until_push_succeeds() {
        let git_ops = MockGitOperations::rejecting(2);
        let updater = BranchUpdater::new(&git_ops, RetryPolicy::quadratic(5, 0)).with_sleep(|_| {});
        let mutations = Cell::new(0);

        let result = updater
            .update("ns/app/pr/pr-1", "Deploy", |dir| {
                mutations.set(mutations.get() + 1);
                assert_eq!(fs::read_to_string(dir.join("existing.yaml")).unwrap(), "from remote");
                fs::write(dir.join("new.yaml"), "new")?;
                Ok(mutations.get())
            })
            .unwrap();

        assert_eq!(result.outcome, UpdateOutcome::Pushed);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.value, 3);
        assert_eq!(mutations.get(), 3);
        assert_eq!(git_ops.pushes.get(), 3);
        assert_eq!(git_ops.commits.get(), 3);
    }

    #[test]
    fn test_every_attempt_uses_a_fresh_working_tree() {
        let git_ops = MockGitOperations::rejecting(2);
        let updater = BranchUpdater::new(&git_ops, RetryPolicy::quadratic(5, 0)).with_sleep(|_| {});

        updater
            .update("main", "Deploy", |dir| {
                assert!(!dir.join("new.yaml").exists());
                fs::write(dir.join("new.yaml"), "new")?;
                Ok(())
            })
            .unwrap();

        let checkouts = git_ops.checkouts.borrow();
        assert_eq!(checkouts.len(), 3);
        assert_ne!(checkouts[0], checkouts[1]);
        assert!(checkouts.iter().all(|dir| !dir.exists()));
    }

    #[test]
    fn test_update_gives_up_after_max_attempts() {
        let git_ops = MockGitOperations::rejecting(u32::MAX);
        let updater = BranchUpdater::new(&git_ops, RetryPolicy::linear(4, 0)).with_sleep(|_| {});

        let result = updater.update("main", "Deploy", |_| Ok(()));

        assert!(matches!(result, Err(Error::RetryExhausted { attempts: 4, .. })));
        assert_eq!(git_ops.pushes.get(), 4);
    }

    #[test]
    fn test_nothing_to_commit_short_circuits() {
        let git_ops = MockGitOperations::without_changes();
        let updater = BranchUpdater::new(&git_ops, RetryPolicy::quadratic(5, 0));

        let result = updater.update("main", "Deploy", |_| Ok("listed")).unwrap();

        assert_eq!(result.outcome, UpdateOutcome::NothingToCommit);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.value, "listed");
        assert_eq!(git_ops.commits.get(), 0);
        assert_eq!(git_ops.pushes.get(), 0);
    }

    #[test]
    fn test_mutation_error_is_fatal() {
        let git_ops = MockGitOperations::rejecting(0);
        let updater = BranchUpdater::new(&git_ops, RetryPolicy::quadratic(5, 0)).with_sleep(|_| {});
        let mutations = Cell::new(0);

        let result: Result<UpdateResult<()>> = updater.update("main", "Deploy", |_| {
            mutations.set(mutations.get() + 1);
            Err(Error::NamingContract {
                path: "applications/x.yaml".to_string(),
                message: "bad".to_string(),
            })
        });

        assert!(matches!(result, Err(Error::NamingContract { .. })));
        assert_eq!(mutations.get(), 1);
        assert_eq!(git_ops.pushes.get(), 0);
    }
}
