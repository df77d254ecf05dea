//! # Prebuilt Branch Reconciliation
//!
//! Rebuilds the `applications/` and `services/` directories of a namespace
//! working tree from up to three sources, in increasing precedence:
//!
//! 1. the **primary prebuilt branch**,
//! 2. the **override prebuilt branch**, for the services it explicitly lists,
//! 3. the services the current run already deployed (the *changed services*),
//!    which are never touched.
//!
//! ## Passes
//!
//! [`sync_services_from_prebuilt`] runs these passes in order:
//!
//! 1. **Cleanup**: delete every file except `.git/` and the manifests of
//!    changed services, so services dropped from the sources disappear.
//! 2. **Primary services**: copy `services/{svc}/*.yaml` with variable
//!    substitution, or aggregate them into `applications/` when requested.
//! 3. **Primary applications**: regenerate one application per service
//!    (skipped when aggregating).
//! 4. **Override services**: as pass 2, restricted to the listed services and
//!    never aggregated.
//! 5. **Override applications**: as pass 3, from the override branch.
//! 6. **Listing**: report which services ended up deployed and from where.
//!
//! Service manifests are byte-copied after substitution. Application
//! manifests are always regenerated, never copied. The passes are not
//! transactional: a failure leaves a partial tree, which the retry driver
//! discards because every attempt starts from a fresh checkout.

use crate::error::{Error, Result};
use crate::manifest::{
    parse_application_manifest, split_application_file_name, Annotations, Application,
    ApplicationContext, Producer,
};
use crate::path::{collect_files, escape};
use crate::substitute::SubstituteVariables;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The primary source of prebuilt manifests.
#[derive(Debug, Clone)]
pub struct PrebuiltBranch {
    pub name: String,
    /// Working tree of the checked-out branch.
    pub directory: PathBuf,
    /// Write service manifests straight into `applications/` instead of
    /// `services/{svc}/`, with no per-service application manifest.
    pub aggregate_to_namespace_directory: bool,
}

/// A secondary source that wins for the services it lists.
#[derive(Debug, Clone)]
pub struct OverridePrebuiltBranch {
    pub services: BTreeSet<String>,
    pub name: String,
    pub directory: PathBuf,
}

/// Inputs for one reconciliation of a namespace working tree.
#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    pub context: &'a ApplicationContext,
    /// Working tree of the namespace branch to rewrite.
    pub namespace_directory: &'a Path,
    pub changed_services: &'a BTreeSet<String>,
    pub prebuilt: &'a PrebuiltBranch,
    pub override_prebuilt: Option<&'a OverridePrebuiltBranch>,
    pub substitute_variables: &'a SubstituteVariables,
}

/// Where a deployed service came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BuiltFrom {
    /// Built by the pull request itself.
    #[serde(rename_all = "camelCase")]
    PullRequest {
        head_ref: Option<String>,
        head_sha: Option<String>,
    },
    /// Copied from a prebuilt branch.
    #[serde(rename_all = "camelCase")]
    PrebuiltBranch {
        prebuilt_branch: Option<String>,
        head_ref: Option<String>,
        head_sha: Option<String>,
    },
}

/// A service present in the namespace after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub service: String,
    pub built_from: BuiltFrom,
}

/// Reconcile a namespace working tree against its prebuilt sources.
///
/// Returns the services listed in `applications/` afterwards.
pub fn sync_services_from_prebuilt(request: &SyncRequest<'_>) -> Result<Vec<Service>> {
    let namespace_dir = request.namespace_directory;

    cleanup_namespace_directory(request.context, namespace_dir, request.changed_services)?;

    let primary_services = copy_service_manifests(
        &request.prebuilt.directory,
        namespace_dir,
        request.context,
        &|service| !request.changed_services.contains(service),
        request.prebuilt.aggregate_to_namespace_directory,
        request.substitute_variables,
    )?;
    info!(
        "Copied service manifests of {} service(s) from {}",
        primary_services.len(),
        request.prebuilt.name
    );

    if request.prebuilt.aggregate_to_namespace_directory {
        debug!("Skipping application manifests of {}: aggregated", request.prebuilt.name);
    } else {
        write_application_manifests(
            &request.prebuilt.directory,
            &request.prebuilt.name,
            namespace_dir,
            request.context,
            &|service| !request.changed_services.contains(service),
        )?;
    }

    if let Some(override_prebuilt) = request.override_prebuilt {
        let is_overridden = |service: &str| {
            override_prebuilt.services.contains(service)
                && !request.changed_services.contains(service)
        };

        let override_services = copy_service_manifests(
            &override_prebuilt.directory,
            namespace_dir,
            request.context,
            &is_overridden,
            false,
            request.substitute_variables,
        )?;
        info!(
            "Copied service manifests of {} service(s) from {}",
            override_services.len(),
            override_prebuilt.name
        );

        write_application_manifests(
            &override_prebuilt.directory,
            &override_prebuilt.name,
            namespace_dir,
            request.context,
            &is_overridden,
        )?;
    }

    list_namespace_services(namespace_dir)
}

/// Delete everything except `.git/` and the manifests of changed services.
fn cleanup_namespace_directory(
    context: &ApplicationContext,
    namespace_dir: &Path,
    changed_services: &BTreeSet<String>,
) -> Result<()> {
    let mut patterns = vec!["**".to_string(), "!.git".to_string(), "!.git/**".to_string()];
    for service in changed_services {
        patterns.push(format!(
            "!applications/{}.yaml",
            escape(&context.application_name(service))
        ));
        patterns.push(format!("!services/{}/**", escape(service)));
    }

    let stale = collect_files(namespace_dir, &patterns)?;
    for relative in &stale {
        let path = namespace_dir.join(relative);
        fs::remove_file(&path).map_err(|e| Error::Filesystem {
            message: format!("Failed to remove '{}': {}", path.display(), e),
        })?;
    }
    debug!("Removed {} stale file(s) from the namespace branch", stale.len());
    Ok(())
}

/// Copy `services/{svc}/*.yaml` from a prebuilt tree, returning the services copied.
fn copy_service_manifests(
    source_dir: &Path,
    namespace_dir: &Path,
    context: &ApplicationContext,
    include_service: &dyn Fn(&str) -> bool,
    aggregate: bool,
    substitute_variables: &SubstituteVariables,
) -> Result<BTreeSet<String>> {
    let mut copied = BTreeSet::new();

    for relative in collect_files(source_dir, &["services/*/*.yaml"])? {
        let (service, file_name) = service_and_file_name(&relative)?;
        if !include_service(&service) {
            continue;
        }

        let destination = if aggregate {
            namespace_dir
                .join("applications")
                .join(format!("{}--{}", context.application_name(&service), file_name))
        } else {
            namespace_dir.join("services").join(&service).join(&file_name)
        };

        let content = fs::read_to_string(source_dir.join(&relative))?;
        write_file(&destination, &substitute_variables.apply(&content))?;
        copied.insert(service);
    }

    Ok(copied)
}

/// Regenerate application manifests from a prebuilt tree's `applications/`.
fn write_application_manifests(
    source_dir: &Path,
    prebuilt_branch: &str,
    namespace_dir: &Path,
    context: &ApplicationContext,
    include_service: &dyn Fn(&str) -> bool,
) -> Result<()> {
    for relative in collect_files(source_dir, &["applications/*.yaml"])? {
        let file_name = file_name_of(&relative)?;
        let (_, service) = split_application_file_name(&file_name)?;
        if !include_service(service) {
            continue;
        }

        let content = fs::read(source_dir.join(&relative))?;
        let source = match parse_application_manifest(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring {} from {}: {}", relative.display(), prebuilt_branch, e);
                continue;
            }
        };

        let annotations = Annotations {
            head_ref: source.head_ref,
            head_sha: source.head_sha,
            built_from_prebuilt_branch: Some(prebuilt_branch.to_string()),
            ..Annotations::new(Producer::BootstrapPullRequest)
        };
        let application = Application::for_service(context, service, annotations);
        write_file(
            &namespace_dir.join(context.application_path(service)),
            &application.to_yaml()?,
        )?;
        info!("Wrote application {} from {}", context.application_name(service), prebuilt_branch);
    }
    Ok(())
}

/// List the services deployed in a namespace working tree.
///
/// Manifests that cannot be parsed, or that were not written by one of
/// these actions, are left out.
pub fn list_namespace_services(namespace_dir: &Path) -> Result<Vec<Service>> {
    let mut services = Vec::new();

    for relative in collect_files(namespace_dir, &["applications/*.yaml"])? {
        let content = fs::read(namespace_dir.join(&relative))?;
        let application = match parse_application_manifest(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Not listing {}: {}", relative.display(), e);
                continue;
            }
        };

        let built_from = match application.producer() {
            Some(Producer::GitPushService) => BuiltFrom::PullRequest {
                head_ref: application.head_ref.clone(),
                head_sha: application.head_sha.clone(),
            },
            Some(Producer::BootstrapPullRequest) => BuiltFrom::PrebuiltBranch {
                prebuilt_branch: application.built_from_prebuilt_branch.clone(),
                head_ref: application.head_ref.clone(),
                head_sha: application.head_sha.clone(),
            },
            None => {
                debug!(
                    "Not listing {}: unknown github.action '{}'",
                    relative.display(),
                    application.action
                );
                continue;
            }
        };

        services.push(Service {
            service: application.service_name().to_string(),
            built_from,
        });
    }

    Ok(services)
}

/// Split `services/{svc}/{file}` into the service and file names.
fn service_and_file_name(relative: &Path) -> Result<(String, String)> {
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    match segments.as_slice() {
        [_, service, file_name] => Ok((service.clone(), file_name.clone())),
        _ => Err(Error::NamingContract {
            path: relative.display().to_string(),
            message: "expected services/{service}/{file}".to_string(),
        }),
    }
}

fn file_name_of(relative: &Path) -> Result<String> {
    relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::NamingContract {
            path: relative.display().to_string(),
            message: "path has no file name".to_string(),
        })
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
            message: format!("Failed to create directory '{}': {}", parent.display(), e),
        })?;
    }
    fs::write(path, content).map_err(|e| Error::Filesystem {
        message: format!("Failed to write file '{}': {}", path.display(), e),
    })
}
