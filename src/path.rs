//! Glob matching and file collection for manifest trees
//!
//! Patterns follow the shell convention used by workflow inputs: a plain
//! pattern includes files, a pattern prefixed with `!` excludes them. Patterns
//! are applied in the order given, so an exclude only removes files matched by
//! includes listed before it.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// `*` stays within a single path segment; `**` crosses segments.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single compiled include or exclude pattern.
#[derive(Debug, Clone)]
enum Rule {
    Include(Pattern),
    Exclude(Pattern),
}

impl Rule {
    fn parse(raw: &str) -> Result<Self> {
        match raw.strip_prefix('!') {
            Some(negated) => Ok(Rule::Exclude(Pattern::new(negated).map_err(Error::Glob)?)),
            None => Ok(Rule::Include(Pattern::new(raw).map_err(Error::Glob)?)),
        }
    }
}

/// Match a relative path against a glob pattern
pub fn glob_match(pattern: &str, path: &str) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    Ok(pattern.matches_with(path, MATCH_OPTIONS))
}

/// Collect the files under `base` selected by `patterns`.
///
/// Returned paths are relative to `base`, sorted, and free of duplicates.
/// Directories are never returned. Every pattern is compiled before the tree
/// is walked, so one malformed pattern fails the whole collection.
pub fn collect_files<S: AsRef<str>>(base: &Path, patterns: &[S]) -> Result<Vec<PathBuf>> {
    let rules = patterns
        .iter()
        .map(|p| Rule::parse(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let candidates = list_relative_files(base)?;
    let mut matched: BTreeSet<String> = BTreeSet::new();

    for rule in &rules {
        match rule {
            Rule::Include(pattern) => {
                for candidate in &candidates {
                    if pattern.matches_with(candidate, MATCH_OPTIONS) {
                        matched.insert(candidate.clone());
                    }
                }
            }
            Rule::Exclude(pattern) => {
                matched.retain(|path| !pattern.matches_with(path, MATCH_OPTIONS));
            }
        }
    }

    Ok(matched.into_iter().map(PathBuf::from).collect())
}

/// Escape a literal value for embedding in a glob pattern.
pub fn escape(literal: &str) -> String {
    Pattern::escape(literal)
}

/// List every regular file under `base` as a `/`-separated relative path.
fn list_relative_files(base: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Filesystem {
            message: format!("Failed to walk '{}': {}", base.display(), e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| Error::Filesystem {
                message: format!("Failed to make path relative: {}", entry.path().display()),
            })?;

        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(segments.join("/"));
    }

    Ok(files)
}
