//! # Application Manifests
//!
//! An application manifest is the Argo CD `Application` document that points
//! the deployment controller at one service's manifests inside a namespace
//! branch. This module covers both directions:
//!
//! - **Reading**: [`parse_application_manifest`] parses bytes into a
//!   [`ParsedApplication`], checking only the fields these actions consume.
//!   Expected-bad input yields a [`ManifestError`] instead of a panic so a
//!   batch can skip one broken file and carry on.
//!
//! - **Writing**: [`Application`] is the typed document that actions
//!   synthesize. It is always rendered whole; existing manifests are never
//!   patched field by field.
//!
//! ## File naming
//!
//! Application manifests are stored as `applications/{namespace}--{service}.yaml`.
//! [`split_application_file_name`] enforces that contract.

use crate::error::{Error, Result};
use crate::namespace::NamespaceBranch;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

pub const ANNOTATION_ACTION: &str = "github.action";
pub const ANNOTATION_HEAD_REF: &str = "github.head-ref";
pub const ANNOTATION_HEAD_SHA: &str = "github.head-sha";
pub const ANNOTATION_BUILT_FROM_PREBUILT_BRANCH: &str = "built-from-prebuilt-branch";

const API_VERSION: &str = "argoproj.io/v1alpha1";
const ARGOCD_NAMESPACE: &str = "argocd";
const RESOURCES_FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";
const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// The action that produced an application manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    /// Written by a pull request build of the service itself.
    GitPushService,
    /// Copied from a prebuilt branch while bootstrapping a namespace.
    BootstrapPullRequest,
}

impl Producer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Producer::GitPushService => "git-push-service",
            Producer::BootstrapPullRequest => "bootstrap-pull-request",
        }
    }

    pub fn from_annotation(value: &str) -> Option<Self> {
        match value {
            "git-push-service" => Some(Producer::GitPushService),
            "bootstrap-pull-request" => Some(Producer::BootstrapPullRequest),
            _ => None,
        }
    }
}

/// Why a manifest was ignored.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Validation(String),
}

/// The fields of an application manifest that these actions read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedApplication {
    /// Raw `github.action` annotation.
    pub action: String,
    pub head_ref: Option<String>,
    pub head_sha: Option<String>,
    pub built_from_prebuilt_branch: Option<String>,
    /// `spec.source.path`
    pub source_path: String,
}

impl ParsedApplication {
    /// The action that wrote this manifest, if it is one of ours.
    pub fn producer(&self) -> Option<Producer> {
        Producer::from_annotation(&self.action)
    }

    /// The service name, recovered from the last segment of `spec.source.path`.
    pub fn service_name(&self) -> &str {
        let trimmed = self.source_path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

/// Parse and validate an application manifest.
pub fn parse_application_manifest(
    content: &[u8],
) -> std::result::Result<ParsedApplication, ManifestError> {
    let document: Value = serde_yaml::from_slice(content)?;

    let annotations = document
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .ok_or_else(|| ManifestError::Validation("metadata.annotations is missing".to_string()))?;

    let action = required_string(annotations, ANNOTATION_ACTION, "metadata.annotations")?;
    let head_ref = optional_string(annotations, ANNOTATION_HEAD_REF, "metadata.annotations")?;
    let head_sha = optional_string(annotations, ANNOTATION_HEAD_SHA, "metadata.annotations")?;
    let built_from_prebuilt_branch = optional_string(
        annotations,
        ANNOTATION_BUILT_FROM_PREBUILT_BRANCH,
        "metadata.annotations",
    )?;

    let source = document
        .get("spec")
        .and_then(|s| s.get("source"))
        .ok_or_else(|| ManifestError::Validation("spec.source is missing".to_string()))?;
    let source_path = required_string(source, "path", "spec.source")?;

    Ok(ParsedApplication {
        action,
        head_ref,
        head_sha,
        built_from_prebuilt_branch,
        source_path,
    })
}

fn required_string(
    parent: &Value,
    key: &str,
    parent_name: &str,
) -> std::result::Result<String, ManifestError> {
    match parent.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ManifestError::Validation(format!(
            "{}['{}'] must be a string",
            parent_name, key
        ))),
        None => Err(ManifestError::Validation(format!(
            "{}['{}'] is missing",
            parent_name, key
        ))),
    }
}

fn optional_string(
    parent: &Value,
    key: &str,
    parent_name: &str,
) -> std::result::Result<Option<String>, ManifestError> {
    match parent.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ManifestError::Validation(format!(
            "{}['{}'] must be a string if present",
            parent_name, key
        ))),
    }
}

/// Split `{prefix}--{service}.yaml` into its prefix and service.
///
/// Application file names are written by these actions, so anything else
/// is a broken branch layout and fails the action.
pub fn split_application_file_name(file_name: &str) -> Result<(&str, &str)> {
    let contract_error = || Error::NamingContract {
        path: file_name.to_string(),
        message: "expected {prefix}--{service}.yaml".to_string(),
    };

    let stem = file_name.strip_suffix(".yaml").ok_or_else(contract_error)?;
    let parts: Vec<&str> = stem.split("--").collect();
    match parts.as_slice() {
        [prefix, service] if !prefix.is_empty() && !service.is_empty() => Ok((*prefix, *service)),
        _ => Err(contract_error()),
    }
}

/// Everything needed to synthesize application manifests for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationContext {
    pub overlay: String,
    pub namespace: String,
    /// Argo CD project the applications belong to.
    pub project: String,
    /// `owner/name` of the repository holding the namespace branches.
    pub destination_repository: String,
    /// Name (without owner) of the repository whose pull requests own the namespaces.
    pub source_repository_name: String,
    /// Base URL of the git server, such as `https://github.com`.
    pub server_url: String,
}

impl ApplicationContext {
    pub fn namespace_branch(&self) -> NamespaceBranch {
        NamespaceBranch::new(
            self.source_repository_name.clone(),
            self.overlay.clone(),
            self.namespace.clone(),
        )
    }

    /// Clone URL of the destination repository.
    pub fn repository_url(&self) -> String {
        format!(
            "{}/{}.git",
            self.server_url.trim_end_matches('/'),
            self.destination_repository
        )
    }

    /// `{namespace}--{service}`
    pub fn application_name(&self, service: &str) -> String {
        format!("{}--{}", self.namespace, service)
    }

    /// Relative path of a service's application manifest.
    pub fn application_path(&self, service: &str) -> String {
        format!("applications/{}.yaml", self.application_name(service))
    }
}

/// Annotations written on every synthesized application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(rename = "github.action")]
    pub action: String,
    #[serde(rename = "github.head-ref", default, skip_serializing_if = "Option::is_none")]
    pub head_ref: Option<String>,
    #[serde(rename = "github.head-sha", default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(
        rename = "built-from-prebuilt-branch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub built_from_prebuilt_branch: Option<String>,
}

impl Annotations {
    pub fn new(producer: Producer) -> Self {
        Self {
            action: producer.as_str().to_string(),
            head_ref: None,
            head_sha: None,
            built_from_prebuilt_branch: None,
        }
    }
}

/// An Argo CD `Application` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub namespace: String,
    pub finalizers: Vec<String>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,
    pub source: Source,
    pub destination: Destination,
    pub sync_policy: SyncPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub target_revision: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub server: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub automated: Automated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automated {
    pub prune: bool,
}

impl Application {
    /// Build the application for `service`, deployed from the namespace branch.
    pub fn for_service(context: &ApplicationContext, service: &str, annotations: Annotations) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: "Application".to_string(),
            metadata: Metadata {
                name: context.application_name(service),
                namespace: ARGOCD_NAMESPACE.to_string(),
                finalizers: vec![RESOURCES_FINALIZER.to_string()],
                annotations,
            },
            spec: ApplicationSpec {
                project: context.project.clone(),
                source: Source {
                    repo_url: context.repository_url(),
                    target_revision: context.namespace_branch().to_string(),
                    path: format!("services/{}", service),
                },
                destination: Destination {
                    server: IN_CLUSTER_SERVER.to_string(),
                    namespace: context.namespace.clone(),
                },
                sync_policy: SyncPolicy {
                    automated: Automated { prune: true },
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
