//! # Action Outputs
//!
//! Commands report their results as named outputs. When running inside a
//! workflow, outputs are appended to the file named by `GITHUB_OUTPUT` in
//! the runner's multiline form:
//!
//! ```text
//! name<<ghadelimiter_5f3a...
//! value
//! ghadelimiter_5f3a...
//! ```
//!
//! The same outputs are printed to stdout as a JSON object, which is what a
//! local run of the tool shows.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gitops_preview::output::ActionOutputs;
//!
//! let mut outputs = ActionOutputs::new();
//! outputs.set("branch", "ns/app/pr/pr-1");
//! outputs.write(std::env::var_os("GITHUB_OUTPUT").as_deref().map(Path::new))?;
//! ```

use crate::error::{Error, Result};
use crate::retry::random_below;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Ordered set of named outputs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionOutputs {
    values: Vec<(String, String)>,
}

impl ActionOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output, replacing an earlier value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Set an output to the JSON encoding of `value`.
    pub fn set_json<T: serde::Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<()> {
        self.set(name, serde_json::to_string(value)?);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Render in the runner's `name<<DELIMITER` form.
    pub fn to_github_output(&self) -> String {
        let mut rendered = String::new();
        for (name, value) in &self.values {
            let delimiter = delimiter_for(value);
            rendered.push_str(&format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter));
        }
        rendered
    }

    /// Render as a JSON object for stdout.
    pub fn to_json(&self) -> Result<String> {
        let object: Map<String, Value> = self
            .values
            .iter()
            .map(|(n, v)| (n.clone(), Value::String(v.clone())))
            .collect();
        Ok(serde_json::to_string_pretty(&Value::Object(object))?)
    }

    /// Append to `github_output` when given, and print the JSON form.
    pub fn write(&self, github_output: Option<&Path>) -> Result<()> {
        if let Some(path) = github_output {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Filesystem {
                    message: format!("Failed to open {}: {}", path.display(), e),
                })?;
            file.write_all(self.to_github_output().as_bytes())?;
        }
        println!("{}", self.to_json()?);
        Ok(())
    }
}

/// A delimiter that does not occur in `value`.
fn delimiter_for(value: &str) -> String {
    loop {
        let delimiter = format!("ghadelimiter_{:016x}", random_below(u64::MAX));
        if !value.contains(&delimiter) {
            return delimiter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse_github_output(text: &str) -> Vec<(String, String)> {
        let mut parsed = Vec::new();
        let mut lines = text.lines();
        while let Some(header) = lines.next() {
            let (name, delimiter) = header.split_once("<<").unwrap();
            let mut value = Vec::new();
            for line in lines.by_ref() {
                if line == delimiter {
                    break;
                }
                value.push(line);
            }
            parsed.push((name.to_string(), value.join("\n")));
        }
        parsed
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let mut outputs = ActionOutputs::new();
        outputs.set("branch", "a");
        outputs.set("pushed", "false");
        outputs.set("branch", "b");
        assert_eq!(outputs.get("branch"), Some("b"));
        assert_eq!(outputs.values.len(), 2);
    }

    #[test]
    fn test_github_output_handles_multiline_values() {
        let mut outputs = ActionOutputs::new();
        outputs.set("services", "a\nb");
        outputs.set("branch", "ns/app/pr/pr-1");

        let parsed = parse_github_output(&outputs.to_github_output());
        assert_eq!(
            parsed,
            vec![
                ("services".to_string(), "a\nb".to_string()),
                ("branch".to_string(), "ns/app/pr/pr-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_json_output() {
        let mut outputs = ActionOutputs::new();
        outputs.set_json("services", &vec!["a", "b"]).unwrap();
        let json: Value = serde_json::from_str(&outputs.to_json().unwrap()).unwrap();
        assert_eq!(json["services"], r#"["a","b"]"#);
    }

    #[test]
    fn test_write_appends_to_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("output");
        fs::write(&path, "existing<<EOF\nx\nEOF\n").unwrap();

        let mut outputs = ActionOutputs::new();
        outputs.set("pushed", "true");
        outputs.write(Some(&path)).unwrap();

        let parsed = parse_github_output(&fs::read_to_string(&path).unwrap());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1], ("pushed".to_string(), "true".to_string()));
    }
}
