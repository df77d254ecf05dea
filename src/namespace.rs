//! Namespace branch naming
//!
//! Every preview namespace lives in its own branch of the destination
//! repository, named `ns/{source-repository-name}/{overlay}/{namespace}`.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// The branch that holds one namespace's manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBranch {
    pub source_repository_name: String,
    pub overlay: String,
    pub namespace: String,
}

impl NamespaceBranch {
    pub fn new(
        source_repository_name: impl Into<String>,
        overlay: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            source_repository_name: source_repository_name.into(),
            overlay: overlay.into(),
            namespace: namespace.into(),
        }
    }

    /// Parse a branch name of the form `ns/{source}/{overlay}/{namespace}`.
    pub fn parse(branch: &str) -> Option<Self> {
        let rest = branch.strip_prefix("ns/")?;
        let mut parts = rest.splitn(3, '/');
        let source = parts.next().filter(|s| !s.is_empty())?;
        let overlay = parts.next().filter(|s| !s.is_empty())?;
        let namespace = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;
        Some(Self::new(source, overlay, namespace))
    }

    /// The branch name prefix shared by every namespace of one overlay.
    pub fn overlay_prefix(source_repository_name: &str, overlay: &str) -> String {
        format!("ns/{}/{}/", source_repository_name, overlay)
    }
}

impl fmt::Display for NamespaceBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ns/{}/{}/{}",
            self.source_repository_name, self.overlay, self.namespace
        )
    }
}

/// Extract `name` from a repository written as `owner/name`.
pub fn repository_name(repository: &str) -> Result<&str> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(name)
        }
        _ => Err(Error::InvalidInput {
            input: "repository".to_string(),
            message: format!("expected owner/name, got '{}'", repository),
        }),
    }
}

/// Extract the pull request number from a namespace such as `pr-123`.
pub fn pull_request_number(namespace: &str, namespace_prefix: &str) -> Option<u64> {
    let digits = namespace.strip_prefix(namespace_prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Select the namespace branches whose pull request is no longer open.
///
/// Branches of another source repository or overlay, or whose namespace
/// does not carry a pull request number, are never selected.
pub fn closed_namespace_branches(
    branches: &[String],
    source_repository_name: &str,
    overlay: &str,
    namespace_prefix: &str,
    open_pull_requests: &BTreeSet<u64>,
) -> Vec<String> {
    branches
        .iter()
        .filter(|branch| {
            NamespaceBranch::parse(branch)
                .filter(|b| b.source_repository_name == source_repository_name)
                .filter(|b| b.overlay == overlay)
                .and_then(|b| pull_request_number(&b.namespace, namespace_prefix))
                .is_some_and(|number| !open_pull_requests.contains(&number))
        })
        .cloned()
        .collect()
}
