//! Git-push-service command implementation
//!
//! Writes the manifests of one service built by a pull request into the
//! namespace branch. Every service job of the pull request pushes to the
//! same branch, so rejections are expected and retried with linear backoff.

use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use gitops_preview::config::{
    parse_list, push_service_retry_policy, validate_segment, PUSH_SERVICE_MAX_ATTEMPTS,
    PUSH_SERVICE_WAIT_MS,
};
use gitops_preview::manifest::ApplicationContext;
use gitops_preview::output::ActionOutputs;
use gitops_preview::publish::ServiceManifest;
use gitops_preview::repository::{
    BranchUpdater, DefaultGitOperations, GitOperations, UpdateOutcome, UpdateResult,
};
use gitops_preview::retry::RetryPolicy;
use gitops_preview::substitute::SubstituteVariables;

use super::{GitHubArgs, NamespaceArgs, RetryArgs};

/// Arguments for the git-push-service command
#[derive(Args, Debug)]
pub struct GitPushServiceArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    /// Argo CD project of the generated application
    #[arg(long, env = "INPUT_PROJECT", default_value = "default")]
    pub project: String,

    /// Name of the service
    #[arg(long, env = "INPUT_SERVICE")]
    pub service: String,

    /// Glob patterns of the manifests to push, relative to --manifests-directory
    #[arg(long, value_name = "PATTERNS", env = "INPUT_MANIFESTS")]
    pub manifests: String,

    /// Directory the manifest patterns are relative to
    #[arg(long, value_name = "PATH", env = "INPUT_MANIFESTS-DIRECTORY", default_value = ".")]
    pub manifests_directory: PathBuf,

    /// KEY=VALUE lines substituted into the manifests as ${KEY}
    #[arg(long, value_name = "LINES", env = "INPUT_SUBSTITUTE-VARIABLES", default_value = "")]
    pub substitute_variables: String,

    /// Head branch of the pull request
    #[arg(long, value_name = "REF", env = "GITHUB_HEAD_REF")]
    pub head_ref: Option<String>,

    /// Commit the service was built from, usually
    /// `github.event.pull_request.head.sha`
    ///
    /// `GITHUB_SHA` is not used: on pull request events it names the merge
    /// commit, not the head of the pull request.
    #[arg(long, value_name = "SHA", env = "INPUT_HEAD-SHA")]
    pub head_sha: Option<String>,

    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(flatten)]
    pub github: GitHubArgs,
}

/// Execute the git-push-service command
pub fn execute(args: GitPushServiceArgs) -> Result<()> {
    args.namespace.validate()?;
    validate_segment("service", &args.service)?;
    let patterns = parse_list(&args.manifests);
    if patterns.is_empty() {
        anyhow::bail!("Missing required input: manifests");
    }
    let substitute_variables = SubstituteVariables::parse(&args.substitute_variables)?;
    let policy = args.retry.policy(
        push_service_retry_policy,
        PUSH_SERVICE_MAX_ATTEMPTS,
        PUSH_SERVICE_WAIT_MS,
    )?;

    let manifest = ServiceManifest::collect(
        &args.service,
        &args.manifests_directory,
        &patterns,
        &substitute_variables,
    )?
    .with_head(args.head_ref, args.head_sha);

    let context = args.github.context()?;
    let application = args.namespace.application_context(&context, &args.project);
    let git_ops = DefaultGitOperations::new(application.repository_url(), context.credentials());

    let result = run(&application, &manifest, &git_ops, policy, &std::thread::sleep)?;

    let mut outputs = ActionOutputs::new();
    outputs.set("branch", application.namespace_branch().to_string());
    outputs.set("application", application.application_path(&manifest.service));
    outputs.set("pushed", (result.outcome == UpdateOutcome::Pushed).to_string());
    args.github.write_outputs(&outputs)
}

fn run(
    application: &ApplicationContext,
    manifest: &ServiceManifest,
    git_ops: &dyn GitOperations,
    policy: RetryPolicy,
    sleep: &dyn Fn(Duration),
) -> Result<UpdateResult<()>> {
    let branch = application.namespace_branch().to_string();
    let message = format!(
        "Deploy {} to namespace {}",
        manifest.service, application.namespace
    );

    let result = BranchUpdater::new(git_ops, policy)
        .with_sleep(sleep)
        .update(&branch, &message, |dir| manifest.write_to(application, dir))?;

    info!(
        "{} {} in {} attempt(s)",
        match result.outcome {
            UpdateOutcome::Pushed => "Pushed",
            UpdateOutcome::NothingToCommit => "Nothing new for",
        },
        manifest.service,
        result.attempts
    );
    Ok(result)
}
