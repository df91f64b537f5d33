//! Property-based tests for snippet fingerprints and cache paths.
//!
//! These tests verify the contracts the build cache relies on:
//! - Determinism: the same snippet always maps to the same entry
//! - Sensitivity: different snippets map to different entries
//! - Shape: fingerprints are 64 lowercase hex characters and parse back

use proptest::prelude::*;
use std::path::Path;
use timebox_core::{EntryPaths, Fingerprint, Snippet};

// =============================================================================
// Strategies
// =============================================================================

/// Arbitrary snippet text, including unicode and control characters
fn snippet_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "package main\n\nfunc main\\(\\) \\{ [a-z]{0,40} \\}".prop_map(String::from),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Contract: fingerprinting is a pure function of the text
    #[test]
    fn fingerprint_is_deterministic(text in snippet_strategy()) {
        let a = Snippet::new(text.clone()).fingerprint();
        let b = Snippet::new(text).fingerprint();
        prop_assert_eq!(a, b);
    }

    /// Contract: distinct texts never share a cache entry
    #[test]
    fn distinct_snippets_have_distinct_fingerprints(
        a in snippet_strategy(),
        b in snippet_strategy()
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(
            Snippet::new(a).fingerprint(),
            Snippet::new(b).fingerprint()
        );
    }

    /// Contract: a fingerprint is usable as a path component and parses back
    #[test]
    fn fingerprint_is_lowercase_hex(text in snippet_strategy()) {
        let fp = Snippet::new(text).fingerprint();
        prop_assert_eq!(fp.as_hex().len(), 64);
        prop_assert!(fp.as_hex().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        prop_assert_eq!(Fingerprint::from_hex(fp.as_hex()).unwrap(), fp);
    }

    /// Contract: source and artifact both live in the entry directory named
    /// by the fingerprint
    #[test]
    fn entry_paths_are_named_by_fingerprint(
        text in snippet_strategy(),
        ext in "[a-z]{1,4}"
    ) {
        let fp = Snippet::new(text).fingerprint();
        let root = Path::new("/var/cache/timebox");
        let paths = EntryPaths::resolve(root, &fp, &ext);

        prop_assert_eq!(paths.entry_dir.parent(), Some(root));
        prop_assert_eq!(paths.source_file.parent(), Some(paths.entry_dir.as_path()));
        prop_assert_eq!(paths.artifact.parent(), Some(paths.entry_dir.as_path()));
        let expected_name = format!("{}.{ext}", fp.as_hex());
        prop_assert_eq!(
            paths.source_file.file_name().and_then(|n| n.to_str()),
            Some(expected_name.as_str())
        );
        prop_assert_ne!(&paths.source_file, &paths.artifact);
    }
}

proptest! {
    /// Contract: anything that is not 64 lowercase hex characters is rejected
    #[test]
    fn malformed_fingerprints_are_rejected(value in "[0-9a-fA-Z]{0,70}") {
        let well_formed = value.len() == 64
            && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
        prop_assert_eq!(Fingerprint::from_hex(value).is_ok(), well_formed);
    }
}
