//! Publishing one freshly built service into a namespace working tree
//!
//! The service's manifests are concatenated into a single
//! `services/{svc}/generated.yaml` and an application manifest pointing at
//! the namespace branch is written next to the other applications.

use crate::error::{Error, Result};
use crate::manifest::{Annotations, Application, ApplicationContext, Producer};
use crate::path::collect_files;
use crate::reconcile::write_file;
use crate::substitute::SubstituteVariables;
use log::{debug, info};
use std::fs;
use std::path::Path;

pub const GENERATED_MANIFEST: &str = "generated.yaml";

/// A built service ready to be written into a namespace branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceManifest {
    pub service: String,
    /// Concatenated manifests, already substituted.
    pub content: String,
    pub head_ref: Option<String>,
    pub head_sha: Option<String>,
}

impl ServiceManifest {
    /// Concatenate the files under `base` matching `patterns` into one
    /// multi-document YAML stream.
    ///
    /// Files are taken in path order. Finding no file at all is an error,
    /// since an empty service would silently undeploy it.
    pub fn collect<S: AsRef<str>>(
        service: &str,
        base: &Path,
        patterns: &[S],
        substitute_variables: &SubstituteVariables,
    ) -> Result<Self> {
        let files = collect_files(base, patterns)?;
        if files.is_empty() {
            return Err(Error::InvalidInput {
                input: "manifests".to_string(),
                message: format!("no manifest matched under {}", base.display()),
            });
        }

        let mut documents = Vec::with_capacity(files.len());
        for relative in &files {
            debug!("Adding {} to {}", relative.display(), service);
            let content = fs::read_to_string(base.join(relative))?;
            documents.push(substitute_variables.apply(content.trim_end()));
        }

        Ok(Self {
            service: service.to_string(),
            content: format!("{}\n", documents.join("\n---\n")),
            head_ref: None,
            head_sha: None,
        })
    }

    pub fn with_head(mut self, head_ref: Option<String>, head_sha: Option<String>) -> Self {
        self.head_ref = head_ref;
        self.head_sha = head_sha;
        self
    }

    /// Replace the service in a namespace working tree.
    ///
    /// Anything previously under `services/{svc}/` is removed first, so files
    /// copied there by a prebuilt reconciliation do not linger.
    pub fn write_to(&self, context: &ApplicationContext, namespace_dir: &Path) -> Result<()> {
        let service_dir = namespace_dir.join("services").join(&self.service);
        if service_dir.exists() {
            fs::remove_dir_all(&service_dir).map_err(|e| Error::Filesystem {
                message: format!("Failed to remove '{}': {}", service_dir.display(), e),
            })?;
        }
        write_file(&service_dir.join(GENERATED_MANIFEST), &self.content)?;

        let annotations = Annotations {
            head_ref: self.head_ref.clone(),
            head_sha: self.head_sha.clone(),
            ..Annotations::new(Producer::GitPushService)
        };
        let application = Application::for_service(context, &self.service, annotations);
        write_file(
            &namespace_dir.join(context.application_path(&self.service)),
            &application.to_yaml()?,
        )?;

        info!(
            "Wrote {} into namespace {}",
            self.service, context.namespace
        );
        Ok(())
    }
}
