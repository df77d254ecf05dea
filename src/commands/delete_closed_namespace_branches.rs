//! Delete-closed-namespace-branches command implementation
//!
//! Garbage-collects the namespaces of pull requests that were closed without
//! their teardown job running. A namespace `{prefix}{number}` belongs to pull
//! request `number`; its branch is deleted unless that pull request is open.

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::collections::BTreeSet;

use gitops_preview::config::validate_segment;
use gitops_preview::github::GitHubOperations;
use gitops_preview::namespace::{closed_namespace_branches, NamespaceBranch};
use gitops_preview::output::ActionOutputs;

use super::GitHubArgs;

/// Arguments for the delete-closed-namespace-branches command
#[derive(Args, Debug)]
pub struct DeleteClosedNamespaceBranchesArgs {
    /// Overlay name, such as `pr`
    #[arg(long, env = "INPUT_OVERLAY")]
    pub overlay: String,

    /// Prefix of namespace names before the pull request number
    #[arg(long, env = "INPUT_NAMESPACE-PREFIX", default_value = "pr-")]
    pub namespace_prefix: String,

    /// Repository holding the namespace branches, as owner/name
    #[arg(long, value_name = "OWNER/NAME", env = "INPUT_DESTINATION-REPOSITORY")]
    pub destination_repository: String,

    /// List the branches that would be deleted without deleting them
    #[arg(short = 'n', long, env = "INPUT_DRY-RUN")]
    pub dry_run: bool,

    #[command(flatten)]
    pub github: GitHubArgs,
}

/// Execute the delete-closed-namespace-branches command
pub fn execute(args: DeleteClosedNamespaceBranchesArgs) -> Result<()> {
    validate_segment("overlay", &args.overlay)?;
    if args.namespace_prefix.contains('/') {
        anyhow::bail!("Invalid namespace-prefix: must not contain '/'");
    }
    gitops_preview::namespace::repository_name(&args.destination_repository)?;

    let context = args.github.context()?;
    let client = context.github_client()?;
    let deleted = run(
        &client,
        &Teardown {
            source_repository: &context.repository,
            source_repository_name: context.repository_name(),
            destination_repository: &args.destination_repository,
            overlay: &args.overlay,
            namespace_prefix: &args.namespace_prefix,
            dry_run: args.dry_run,
        },
    )?;

    let mut outputs = ActionOutputs::new();
    outputs.set_json("deleted-branches", &deleted)?;
    args.github.write_outputs(&outputs)
}

struct Teardown<'a> {
    source_repository: &'a str,
    source_repository_name: &'a str,
    destination_repository: &'a str,
    overlay: &'a str,
    namespace_prefix: &'a str,
    dry_run: bool,
}

fn run(github: &dyn GitHubOperations, teardown: &Teardown<'_>) -> Result<Vec<String>> {
    let overlay_prefix =
        NamespaceBranch::overlay_prefix(teardown.source_repository_name, teardown.overlay);
    let refs = github
        .list_matching_refs(
            teardown.destination_repository,
            &format!("heads/{}{}", overlay_prefix, teardown.namespace_prefix),
        )
        .context("Failed to list namespace branches")?;
    let branches: Vec<String> = refs
        .iter()
        .filter_map(|r| r.branch())
        .map(String::from)
        .collect();

    let open: BTreeSet<u64> = github
        .list_open_pull_requests(teardown.source_repository)
        .context("Failed to list open pull requests")?
        .into_iter()
        .map(|pr| pr.number)
        .collect();

    let closed = closed_namespace_branches(
        &branches,
        teardown.source_repository_name,
        teardown.overlay,
        teardown.namespace_prefix,
        &open,
    );
    info!(
        "{} namespace branch(es), {} open pull request(s), {} to delete",
        branches.len(),
        open.len(),
        closed.len()
    );

    for branch in &closed {
        if teardown.dry_run {
            info!("Would delete {}", branch);
            continue;
        }
        github
            .delete_ref(teardown.destination_repository, &format!("heads/{}", branch))
            .with_context(|| format!("Failed to delete branch {}", branch))?;
    }
    Ok(closed)
}
