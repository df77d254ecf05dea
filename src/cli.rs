//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// GitOps Preview - Manage preview namespaces of pull requests
#[derive(Parser, Debug)]
#[command(name = "gitops-preview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild a namespace branch from prebuilt branches
    BootstrapPullRequest(commands::bootstrap_pull_request::BootstrapPullRequestArgs),

    /// Push the manifests of one built service into a namespace branch
    GitPushService(commands::git_push_service::GitPushServiceArgs),

    /// Delete the namespace branch of a pull request
    DeleteNamespaceBranch(commands::delete_namespace_branch::DeleteNamespaceBranchArgs),

    /// Delete namespace branches whose pull request is no longer open
    DeleteClosedNamespaceBranches(
        commands::delete_closed_namespace_branches::DeleteClosedNamespaceBranchesArgs,
    ),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        match self.command {
            Commands::BootstrapPullRequest(args) => commands::bootstrap_pull_request::execute(args),
            Commands::GitPushService(args) => commands::git_push_service::execute(args),
            Commands::DeleteNamespaceBranch(args) => commands::delete_namespace_branch::execute(args),
            Commands::DeleteClosedNamespaceBranches(args) => {
                commands::delete_closed_namespace_branches::execute(args)
            }
        }
    }
}

/// Log to stderr at `level`, unless `RUST_LOG` says otherwise.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second init (in tests) is harmless
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
