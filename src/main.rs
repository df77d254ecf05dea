//! # GitOps Preview CLI
//!
//! This is the binary entry point for the `gitops-preview` command-line tool,
//! which runs as the entry point of the workflow actions.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments and action inputs using `clap`.
//! - Executing the appropriate command based on the parsed arguments.
//! - Reporting errors with their full context and a non-zero exit status.
//!
//! The core logic lives in the library crate; the binary is a thin wrapper.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
