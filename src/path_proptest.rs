//! Property-based tests for file collection and placeholder substitution.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{collect_files, escape, glob_match};
    use crate::substitute::SubstituteVariables;
    use proptest::prelude::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn relative_path() -> impl Strategy<Value = String> {
        "[a-z]{1,5}(/[a-z]{1,5}){0,3}"
    }

    // ============================================================================
    // glob_match property tests
    // ============================================================================

    proptest! {
        /// Property: `**` matches every relative path
        #[test]
        fn double_star_matches_everything(path in relative_path()) {
            prop_assert!(glob_match("**", &path).unwrap());
        }

        /// Property: `*` never crosses a path separator
        #[test]
        fn single_star_stays_in_one_segment(path in relative_path()) {
            let matched = glob_match("*", &path).unwrap();
            prop_assert_eq!(matched, !path.contains('/'));
        }

        /// Property: an escaped literal matches itself
        #[test]
        fn escaped_literal_matches_itself(literal in "[a-z*?\\[\\]-]{1,10}") {
            prop_assert!(glob_match(&escape(&literal), &literal).unwrap());
        }
    }

    // ============================================================================
    // collect_files property tests
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: collection is sorted, deduplicated and matches the files on disk
        #[test]
        fn collect_all_returns_every_file_sorted(
            paths in prop::collection::btree_set(relative_path(), 1..12)
        ) {
            let temp = TempDir::new().unwrap();
            let mut written = Vec::new();
            for path in &paths {
                let full = temp.path().join(path);
                // A generated path can be a prefix of another; keep the directory
                if full.is_dir() || paths.iter().any(|p| p.starts_with(&format!("{}/", path))) {
                    continue;
                }
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                if fs::write(&full, "x").is_ok() {
                    written.push(PathBuf::from(path));
                }
            }

            let collected = collect_files(temp.path(), &["**", "**"]).unwrap();

            let mut expected = written.clone();
            expected.sort();
            let mut sorted = collected.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&collected, &sorted);
            prop_assert_eq!(collected, expected);
        }

        /// Property: excluding what was included leaves nothing
        #[test]
        fn include_then_exclude_is_empty(
            paths in prop::collection::btree_set("[a-z]{1,5}/[a-z]{1,5}\\.yaml", 1..8)
        ) {
            let temp = TempDir::new().unwrap();
            for path in &paths {
                let full = temp.path().join(path);
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, "x").unwrap();
            }

            let collected = collect_files(temp.path(), &["*/*.yaml", "!*/*.yaml"]).unwrap();
            prop_assert!(collected.is_empty());

            // An exclude listed first has no effect
            let collected = collect_files(temp.path(), &["!*/*.yaml", "*/*.yaml"]).unwrap();
            prop_assert_eq!(collected.len(), paths.len());
        }
    }

    // ============================================================================
    // substitution property tests
    // ============================================================================

    proptest! {
        /// Property: text without placeholders is returned unchanged
        #[test]
        fn text_without_placeholders_is_unchanged(
            text in "[^$]*",
            key in "[A-Z]{1,6}",
            value in ".*"
        ) {
            let vars = SubstituteVariables::from_iter([(key, value)]);
            prop_assert_eq!(vars.apply(&text), text);
        }

        /// Property: known placeholders are fully replaced
        #[test]
        fn known_placeholders_are_replaced(
            entries in prop::collection::vec(("[A-M]{1,4}", "[a-z0-9 ]{0,8}"), 1..5),
            picks in prop::collection::vec((any::<prop::sample::Index>(), "[a-z: ]{0,6}"), 0..8)
        ) {
            let vars = SubstituteVariables::from_iter(entries.clone());
            let keys: Vec<&str> = vars.iter().map(|(k, _)| k).collect();

            let mut template = String::new();
            let mut expected = String::new();
            for (index, filler) in &picks {
                let key = keys[index.index(keys.len())];
                let value = vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v).unwrap();
                template.push_str(&format!("${{{}}}{}", key, filler));
                expected.push_str(value);
                expected.push_str(filler);
            }

            prop_assert_eq!(vars.apply(&template), expected);
        }

        /// Property: placeholders without a variable are kept verbatim
        #[test]
        fn unknown_placeholders_are_kept(
            entries in prop::collection::vec(("[A-M]{1,4}", "[a-z]{0,8}"), 0..4),
            unknown in prop::collection::vec("[N-Z]{1,4}", 1..5)
        ) {
            let vars = SubstituteVariables::from_iter(entries);
            let template: String = unknown
                .iter()
                .map(|name| format!("x ${{{}}} ", name))
                .collect();
            prop_assert_eq!(vars.apply(&template), template);
        }

        /// Property: applying twice equals applying once when values hold no placeholders
        #[test]
        fn substitution_is_idempotent(
            entries in prop::collection::vec(("[A-M]{1,4}", "[a-z0-9]{0,8}"), 1..4),
            template in "([a-z ]{0,4}\\$\\{[A-Z]{1,4}\\})*"
        ) {
            let vars = SubstituteVariables::from_iter(entries);
            let once = vars.apply(&template);
            prop_assert_eq!(vars.apply(&once), once.clone());
        }
    }
}
