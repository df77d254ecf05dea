//! # GitOps Preview Environments
//!
//! This library implements the actions that keep per-pull-request preview
//! namespaces in a GitOps repository. Each namespace is a branch of the
//! destination repository, `ns/{source-repository}/{overlay}/{namespace}`,
//! holding two directories that Argo CD watches:
//!
//! - `applications/{namespace}--{service}.yaml`: one Argo CD `Application`
//!   per service, pointing back at the namespace branch.
//! - `services/{service}/*.yaml`: the Kubernetes manifests of the service.
//!
//! ## Quick Example
//!
//! ```
//! use gitops_preview::substitute::SubstituteVariables;
//! use gitops_preview::path::glob_match;
//!
//! let vars = SubstituteVariables::parse("NAMESPACE=pr-1").unwrap();
//! assert_eq!(vars.apply("host: ${NAMESPACE}.example.com"), "host: pr-1.example.com");
//!
//! assert!(glob_match("services/*/*.yaml", "services/api/deploy.yaml").unwrap());
//! assert!(!glob_match("services/*.yaml", "services/api/deploy.yaml").unwrap());
//! ```
//!
//! ## Core Concepts
//!
//! - **File collection (`path`)**: ordered include/exclude glob patterns
//!   evaluated against a directory tree.
//! - **Application manifests (`manifest`)**: parsing and validating the
//!   applications written by these actions, and generating new ones.
//! - **Reconciliation (`reconcile`)**: rebuilding a namespace from prebuilt
//!   branches while preserving services the pull request deployed itself.
//! - **Publishing (`publish`)**: writing one freshly built service.
//! - **Branch updates (`repository`, `git`, `retry`)**: checkout, mutate,
//!   commit and push, retried with jittered backoff when another job pushed
//!   to the same branch first.
//! - **Teardown (`github`, `namespace`)**: deleting namespace branches of
//!   closed pull requests through the REST API.

pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod github;
pub mod manifest;
pub mod namespace;
pub mod output;
pub mod path;
pub mod publish;
pub mod reconcile;
pub mod repository;
pub mod retry;
pub mod substitute;

#[cfg(test)]
mod path_proptest;
