//! Delete-namespace-branch command implementation
//!
//! Tears down one namespace by deleting its branch; Argo CD prunes the
//! applications once the branch is gone. Deleting a branch that does not
//! exist succeeds.

use anyhow::{Context, Result};
use clap::Args;

use gitops_preview::github::{DeleteOutcome, GitHubOperations};
use gitops_preview::namespace::NamespaceBranch;
use gitops_preview::output::ActionOutputs;

use super::{GitHubArgs, NamespaceArgs};

/// Arguments for the delete-namespace-branch command
#[derive(Args, Debug)]
pub struct DeleteNamespaceBranchArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    #[command(flatten)]
    pub github: GitHubArgs,
}

/// Execute the delete-namespace-branch command
pub fn execute(args: DeleteNamespaceBranchArgs) -> Result<()> {
    args.namespace.validate()?;
    let context = args.github.context()?;
    let branch = NamespaceBranch::new(
        context.repository_name(),
        args.namespace.overlay.as_str(),
        args.namespace.namespace.as_str(),
    );

    let client = context.github_client()?;
    let outcome = run(&client, &args.namespace.destination_repository, &branch)?;

    let mut outputs = ActionOutputs::new();
    outputs.set("branch", branch.to_string());
    outputs.set("deleted", (outcome == DeleteOutcome::Deleted).to_string());
    args.github.write_outputs(&outputs)
}

fn run(
    github: &dyn GitHubOperations,
    repository: &str,
    branch: &NamespaceBranch,
) -> Result<DeleteOutcome> {
    github
        .delete_ref(repository, &format!("heads/{}", branch))
        .with_context(|| format!("Failed to delete branch {} of {}", branch, repository))
}
