//! Literal `${KEY}` placeholder substitution for copied manifests

use crate::error::{Error, Result};

/// An ordered set of placeholder substitutions.
///
/// Keys keep their insertion order. When two keys could both match at the
/// same position, the one inserted first wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstituteVariables {
    entries: Vec<(String, String)>,
}

impl SubstituteVariables {
    /// Create an empty substitution map
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` lines from a multiline action input.
    ///
    /// Blank lines are ignored. The value is everything after the first `=`,
    /// so values may themselves contain `=`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut variables = Self::new();
        for (index, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::InvalidInput {
                    input: "substitute-variables".to_string(),
                    message: format!("line {} must be KEY=VALUE: {}", index + 1, line),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidInput {
                    input: "substitute-variables".to_string(),
                    message: format!("line {} has an empty key", index + 1),
                });
            }
            variables.insert(key, value);
        }
        Ok(variables)
    }

    /// Set a variable, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every `${KEY}` token whose key is known.
    ///
    /// The input is scanned once from left to right. Replacement text is
    /// emitted as-is and never rescanned, and unknown placeholders are kept.
    pub fn apply(&self, content: &str) -> String {
        if self.entries.is_empty() {
            return content.to_string();
        }

        let mut output = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let token = &rest[start + 2..];

            let hit = self.entries.iter().find(|(key, _)| {
                token.starts_with(key.as_str()) && token[key.len()..].starts_with('}')
            });

            match hit {
                Some((key, value)) => {
                    output.push_str(value);
                    rest = &token[key.len() + 1..];
                }
                None => {
                    output.push_str("${");
                    rest = token;
                }
            }
        }

        output.push_str(rest);
        output
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstituteVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (key, value) in iter {
            variables.insert(key, value);
        }
        variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_known_keys() {
        let vars: SubstituteVariables = [("DOMAIN", "pr-1.example.com"), ("NAMESPACE", "pr-1")]
            .into_iter()
            .collect();
        let output = vars.apply("host: ${DOMAIN}\nnamespace: ${NAMESPACE}\n");
        assert_eq!(output, "host: pr-1.example.com\nnamespace: pr-1\n");
    }

    #[test]
    fn test_apply_replaces_every_occurrence() {
        let vars: SubstituteVariables = [("NS", "pr-2")].into_iter().collect();
        assert_eq!(vars.apply("${NS}-${NS}.${NS}"), "pr-2-pr-2.pr-2");
    }

    #[test]
    fn test_unknown_placeholders_pass_through() {
        let vars: SubstituteVariables = [("NS", "pr-2")].into_iter().collect();
        assert_eq!(vars.apply("${UNKNOWN} ${NS}"), "${UNKNOWN} pr-2");
    }

    #[test]
    fn test_replacement_is_not_rescanned() {
        let vars: SubstituteVariables = [("A", "${B}"), ("B", "oops")].into_iter().collect();
        assert_eq!(vars.apply("${A} ${B}"), "${B} oops");
    }

    #[test]
    fn test_unterminated_and_partial_tokens_are_kept() {
        let vars: SubstituteVariables = [("NS", "pr-3")].into_iter().collect();
        assert_eq!(vars.apply("${NS"), "${NS");
        assert_eq!(vars.apply("$NS {NS}"), "$NS {NS}");
        assert_eq!(vars.apply("${NSX}"), "${NSX}");
        assert_eq!(vars.apply("$${NS}"), "$pr-3");
    }

    #[test]
    fn test_empty_map_returns_input() {
        let vars = SubstituteVariables::new();
        assert_eq!(vars.apply("${ANY}"), "${ANY}");
    }

    #[test]
    fn test_parse_key_value_lines() {
        let vars = SubstituteVariables::parse("DOMAIN=pr-1.example.com\n\n  QUERY=a=b  \n").unwrap();
        assert_eq!(
            vars.iter().collect::<Vec<_>>(),
            vec![("DOMAIN", "pr-1.example.com"), ("QUERY", "a=b")]
        );
    }

    #[test]
    fn test_parse_rejects_line_without_separator() {
        let err = SubstituteVariables::parse("DOMAIN=x\nBROKEN\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_rejects_empty_key() {
        assert!(SubstituteVariables::parse("=value").is_err());
    }

    #[test]
    fn test_insert_replaces_value_in_place() {
        let mut vars = SubstituteVariables::new();
        vars.insert("A", "1");
        vars.insert("B", "2");
        vars.insert("A", "3");
        assert_eq!(vars.iter().collect::<Vec<_>>(), vec![("A", "3"), ("B", "2")]);
        assert_eq!(vars.len(), 2);
    }
}
