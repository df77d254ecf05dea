//! Shared test utilities for integration and E2E tests.
//!
//! This module provides fixtures for prebuilt and namespace trees, manifest
//! builders, a CLI command isolated from the runner environment, and a local
//! stand-in for the REST API.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let prebuilt = TestFixture::new().with_prebuilt_service("main", "a");
//! ```

use assert_fs::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{application_yaml, command, snapshot, StubApi, TestFixture};
}

/// An application manifest as the actions write it.
#[allow(dead_code)]
pub fn application_yaml(name: &str, action: &str, service: &str) -> String {
    format!(
        r#"apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: {name}
  namespace: argocd
  annotations:
    github.action: {action}
    github.head-ref: main
    github.head-sha: "0123456789abcdef"
spec:
  project: default
  source:
    repoURL: https://github.com/octo/manifests.git
    targetRevision: prebuilt/app/pr
    path: services/{service}
  destination:
    server: https://kubernetes.default.svc
    namespace: {name}
"#
    )
}

/// Every file under `dir` except `.git/`, keyed by relative path.
#[allow(dead_code)]
pub fn snapshot(dir: &Path) -> BTreeMap<String, String> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(dir).ok()?.to_string_lossy().replace('\\', "/");
            if relative.starts_with(".git/") {
                return None;
            }
            Some((relative, fs::read_to_string(e.path()).ok()?))
        })
        .collect()
}

/// A CLI command that does not see the runner environment of the test process.
#[allow(dead_code)]
pub fn command() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("gitops-preview");
    for (key, _) in std::env::vars() {
        if key.starts_with("GITHUB_") || key.starts_with("INPUT_") || key == "RUST_LOG" {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// A REST API on `127.0.0.1:0` answering from a fixed route table.
///
/// Routes are keyed by `"METHOD /path"` with the query string stripped.
/// Anything else answers 404 like GitHub does.
#[allow(dead_code)]
pub struct StubApi {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl StubApi {
    pub fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let url = format!("http://{}", listener.local_addr().expect("Failed to read address"));
        let routes: Vec<(String, u16, String)> = routes
            .iter()
            .map(|(key, status, body)| (key.to_string(), *status, body.to_string()))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        std::thread::spawn(move || {
            for mut stream in listener.incoming().filter_map(Result::ok) {
                let Ok(reader) = stream.try_clone() else {
                    continue;
                };
                let mut lines = BufReader::new(reader).lines();
                let request_line = lines.next().and_then(Result::ok).unwrap_or_default();
                // Requests carry no body, so the headers end the request
                for line in lines.by_ref() {
                    match line {
                        Ok(line) if !line.is_empty() => {}
                        _ => break,
                    }
                }

                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default();
                let path = parts.next().unwrap_or_default();
                let path = path.split('?').next().unwrap_or_default();
                let key = format!("{} {}", method, path);
                seen.lock().unwrap().push(key.clone());

                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == key)
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, r#"{"message":"Not Found"}"#.to_string()));
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every request served so far, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with("DELETE "))
            .collect()
    }
}

/// A temporary directory laid out like a branch of the destination repository.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add a service as a prebuilt branch holds it: an application manifest
    /// named `{namespace}--{service}` and one deployment manifest.
    pub fn with_prebuilt_service(self, namespace: &str, service: &str) -> Self {
        let name = format!("{}--{}", namespace, service);
        self.with_file(
            &format!("applications/{}.yaml", name),
            &application_yaml(&name, "git-push-service", service),
        )
        .with_file(
            &format!("services/{}/deployment.yaml", service),
            &format!(
                "kind: Deployment\nmetadata:\n  name: {}\n  namespace: ${{NAMESPACE}}\n",
                service
            ),
        )
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.temp_dir.path().join(path).exists()
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(path)).expect("Failed to read file")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_prebuilt_service_layout() {
        let fixture = TestFixture::new().with_prebuilt_service("main", "a");
        assert!(fixture.exists("applications/main--a.yaml"));
        assert!(fixture.exists("services/a/deployment.yaml"));
    }

    #[test]
    fn test_snapshot_skips_git_directory() {
        let fixture = TestFixture::new()
            .with_file(".git/HEAD", "ref: refs/heads/main")
            .with_file("a.yaml", "a");
        let files = snapshot(fixture.path());
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["a.yaml"]);
    }

    #[test]
    fn test_application_yaml_is_valid_yaml() {
        let yaml = application_yaml("main--a", "git-push-service", "a");
        serde_yaml::from_str::<serde_yaml::Value>(&yaml).expect("should be valid YAML");
    }
}
