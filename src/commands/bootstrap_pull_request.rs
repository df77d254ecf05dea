//! Bootstrap-pull-request command implementation
//!
//! Rebuilds a namespace branch from the prebuilt branch (and optionally an
//! override prebuilt branch), keeping the services the pull request already
//! deployed. The prebuilt branches are checked out once; the namespace branch
//! is checked out fresh on every push attempt.

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::collections::BTreeSet;
use std::time::Duration;

use gitops_preview::config::{
    bootstrap_retry_policy, parse_services, BOOTSTRAP_MAX_ATTEMPTS, BOOTSTRAP_WAIT_MS,
};
use gitops_preview::manifest::ApplicationContext;
use gitops_preview::output::ActionOutputs;
use gitops_preview::reconcile::{
    sync_services_from_prebuilt, OverridePrebuiltBranch, PrebuiltBranch, Service, SyncRequest,
};
use gitops_preview::repository::{
    BranchUpdater, DefaultGitOperations, GitOperations, UpdateOutcome, UpdateResult,
};
use gitops_preview::retry::RetryPolicy;
use gitops_preview::substitute::SubstituteVariables;

use super::{GitHubArgs, NamespaceArgs, RetryArgs};

/// Arguments for the bootstrap-pull-request command
#[derive(Args, Debug)]
pub struct BootstrapPullRequestArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    /// Argo CD project of the generated applications
    #[arg(long, env = "INPUT_PROJECT", default_value = "default")]
    pub project: String,

    /// Branch holding the prebuilt manifests of every service
    #[arg(long, value_name = "BRANCH", env = "INPUT_PREBUILT-BRANCH")]
    pub prebuilt_branch: String,

    /// Write prebuilt service manifests straight into applications/
    #[arg(long, env = "INPUT_AGGREGATE-TO-NAMESPACE-DIRECTORY")]
    pub aggregate_to_namespace_directory: bool,

    /// Branch whose manifests win for the override services
    #[arg(long, value_name = "BRANCH", env = "INPUT_OVERRIDE-PREBUILT-BRANCH")]
    pub override_prebuilt_branch: Option<String>,

    /// Services taken from the override prebuilt branch (newline or comma separated)
    #[arg(long, value_name = "LIST", env = "INPUT_OVERRIDE-SERVICES", default_value = "")]
    pub override_services: String,

    /// Services already deployed by this pull request (newline or comma separated)
    #[arg(long, value_name = "LIST", env = "INPUT_CHANGED-SERVICES", default_value = "")]
    pub changed_services: String,

    /// KEY=VALUE lines substituted into service manifests as ${KEY}
    #[arg(long, value_name = "LINES", env = "INPUT_SUBSTITUTE-VARIABLES", default_value = "")]
    pub substitute_variables: String,

    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(flatten)]
    pub github: GitHubArgs,
}

/// Validated inputs of one bootstrap run
#[derive(Debug)]
struct Bootstrap {
    application: ApplicationContext,
    prebuilt_branch: String,
    aggregate: bool,
    override_branch: Option<(String, BTreeSet<String>)>,
    changed_services: BTreeSet<String>,
    substitute_variables: SubstituteVariables,
    policy: RetryPolicy,
}

/// Execute the bootstrap-pull-request command
pub fn execute(args: BootstrapPullRequestArgs) -> Result<()> {
    args.namespace.validate()?;
    let changed_services = parse_services("changed-services", &args.changed_services)?;
    let override_services = parse_services("override-services", &args.override_services)?;
    let substitute_variables = SubstituteVariables::parse(&args.substitute_variables)?;
    let policy = args
        .retry
        .policy(bootstrap_retry_policy, BOOTSTRAP_MAX_ATTEMPTS, BOOTSTRAP_WAIT_MS)?;

    if args.prebuilt_branch.trim().is_empty() {
        anyhow::bail!("Missing required input: prebuilt-branch");
    }
    let override_branch = match args.override_prebuilt_branch.filter(|b| !b.trim().is_empty()) {
        Some(branch) => Some((branch, override_services)),
        None if !override_services.is_empty() => {
            anyhow::bail!("override-services requires override-prebuilt-branch")
        }
        None => None,
    };

    let context = args.github.context()?;
    let bootstrap = Bootstrap {
        application: args.namespace.application_context(&context, &args.project),
        prebuilt_branch: args.prebuilt_branch,
        aggregate: args.aggregate_to_namespace_directory,
        override_branch,
        changed_services,
        substitute_variables,
        policy,
    };

    let git_ops = DefaultGitOperations::new(
        bootstrap.application.repository_url(),
        context.credentials(),
    );
    let result = run(&bootstrap, &git_ops, &std::thread::sleep)?;

    let mut outputs = ActionOutputs::new();
    outputs.set("branch", bootstrap.application.namespace_branch().to_string());
    outputs.set_json("services", &result.value)?;
    outputs.set(
        "pushed",
        (result.outcome == UpdateOutcome::Pushed).to_string(),
    );
    args.github.write_outputs(&outputs)
}

fn run(
    bootstrap: &Bootstrap,
    git_ops: &dyn GitOperations,
    sleep: &dyn Fn(Duration),
) -> Result<UpdateResult<Vec<Service>>> {
    let prebuilt_dir = checkout_prebuilt(git_ops, &bootstrap.prebuilt_branch)?;
    let prebuilt = PrebuiltBranch {
        name: bootstrap.prebuilt_branch.clone(),
        directory: prebuilt_dir.path().to_path_buf(),
        aggregate_to_namespace_directory: bootstrap.aggregate,
    };

    let override_dir = match &bootstrap.override_branch {
        Some((branch, services)) => {
            let dir = checkout_prebuilt(git_ops, branch)?;
            let override_prebuilt = OverridePrebuiltBranch {
                services: services.clone(),
                name: branch.clone(),
                directory: dir.path().to_path_buf(),
            };
            Some((dir, override_prebuilt))
        }
        None => None,
    };

    let namespace_branch = bootstrap.application.namespace_branch().to_string();
    let message = format!("Bootstrap namespace {}", bootstrap.application.namespace);
    let updater = BranchUpdater::new(git_ops, bootstrap.policy).with_sleep(sleep);

    let result = updater.update(&namespace_branch, &message, |dir| {
        sync_services_from_prebuilt(&SyncRequest {
            context: &bootstrap.application,
            namespace_directory: dir,
            changed_services: &bootstrap.changed_services,
            prebuilt: &prebuilt,
            override_prebuilt: override_dir.as_ref().map(|(_, o)| o),
            substitute_variables: &bootstrap.substitute_variables,
        })
    })?;

    info!(
        "Namespace {} has {} service(s) after {} attempt(s)",
        namespace_branch,
        result.value.len(),
        result.attempts
    );
    Ok(result)
}

/// Check out a prebuilt branch into a temporary directory.
fn checkout_prebuilt(git_ops: &dyn GitOperations, branch: &str) -> Result<tempfile::TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("gitops-prebuilt-")
        .tempdir()
        .context("Failed to create a temporary directory")?;
    if !git_ops.checkout(branch, dir.path())? {
        anyhow::bail!("Prebuilt branch not found: {}", branch);
    }
    Ok(dir)
}
