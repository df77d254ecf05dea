//! # Action Input Parsing
//!
//! Workflow inputs arrive as plain strings. Lists are written one item per
//! line or separated by commas, which is how multiline inputs look after the
//! runner passes them through `INPUT_*` environment variables. This module
//! turns those strings into typed values and holds the default retry
//! settings of each action.

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use std::collections::BTreeSet;

/// Retry defaults for actions that rewrite a whole namespace branch.
pub const BOOTSTRAP_MAX_ATTEMPTS: u32 = 5;
pub const BOOTSTRAP_WAIT_MS: u64 = 3000;

/// Retry defaults for `git-push-service`. Many service jobs of one pull
/// request push to the same namespace branch at once, so the budget is large
/// and the backoff linear.
pub const PUSH_SERVICE_MAX_ATTEMPTS: u32 = 50;
pub const PUSH_SERVICE_WAIT_MS: u64 = 3000;

/// Split a multiline or comma separated input into trimmed, non-empty items.
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(['\n', ','])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a list of service names, rejecting names that cannot be path segments.
pub fn parse_services(input_name: &str, input: &str) -> Result<BTreeSet<String>> {
    let mut services = BTreeSet::new();
    for service in parse_list(input) {
        validate_segment(input_name, &service)?;
        services.insert(service);
    }
    Ok(services)
}

/// Check that a value can be used as a single path or branch segment.
pub fn validate_segment(input_name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::MissingInput {
            input: input_name.to_string(),
            hint: None,
        });
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) || value.contains("--") {
        return Err(Error::InvalidInput {
            input: input_name.to_string(),
            message: format!(
                "'{}' must be a single path segment without '/' or '--'",
                value
            ),
        });
    }
    Ok(())
}

pub fn bootstrap_retry_policy(max_attempts: u32, wait_ms: u64) -> RetryPolicy {
    RetryPolicy::quadratic(max_attempts, wait_ms)
}

pub fn push_service_retry_policy(max_attempts: u32, wait_ms: u64) -> RetryPolicy {
    RetryPolicy::linear(max_attempts, wait_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    #[test]
    fn test_parse_list_accepts_lines_and_commas() {
        assert_eq!(
            parse_list("a\n b ,c\n\n,d,"),
            vec!["a", "b", "c", "d"]
        );
        assert!(parse_list("  \n ").is_empty());
    }

    #[test]
    fn test_parse_services_deduplicates_and_sorts() {
        let services = parse_services("changed-services", "web\napi\nweb").unwrap();
        assert_eq!(services.into_iter().collect::<Vec<_>>(), vec!["api", "web"]);
    }

    #[test]
    fn test_parse_services_rejects_paths() {
        assert!(parse_services("changed-services", "api/v1").is_err());
        assert!(parse_services("changed-services", "..").is_err());
        assert!(parse_services("changed-services", "a--b").is_err());
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("namespace", "pr-1").is_ok());
        assert!(matches!(
            validate_segment("namespace", ""),
            Err(Error::MissingInput { .. })
        ));
        assert!(matches!(
            validate_segment("namespace", "a/b"),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_retry_policies() {
        assert_eq!(bootstrap_retry_policy(5, 10).backoff, Backoff::Quadratic);
        assert_eq!(push_service_retry_policy(50, 10).backoff, Backoff::Linear);
    }
}
