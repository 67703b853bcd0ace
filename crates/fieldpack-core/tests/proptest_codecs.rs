// crates/fieldpack-core/tests/proptest_codecs.rs
// ============================================================================
// Module: Codec Property-Based Tests
// Description: Property tests for canonical hashing and input parsers.
// Purpose: Detect panics and ordering sensitivity across wide input ranges.
// ============================================================================

//! Property-based tests for canonical encoding invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use fieldpack_core::GraphDelta;
use fieldpack_core::canonical_sha256_hex;
use fieldpack_core::edge_key;
use fieldpack_core::runtime::archive::is_safe_member_name;
use fieldpack_core::runtime::archive::validate_label;
use proptest::prelude::*;
use serde_json::Map;
use serde_json::Value;

fn object_from(pairs: &[(String, i64)]) -> Map<String, Value> {
    let mut object = Map::new();
    for (key, value) in pairs {
        object.insert(key.clone(), Value::from(*value));
    }
    object
}

proptest! {
    #[test]
    fn canonical_hash_ignores_key_order(
        map in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0 .. 8)
    ) {
        let forward: Vec<(String, i64)> = map.into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();
        let a = canonical_sha256_hex(&Value::Object(object_from(&forward))).unwrap();
        let b = canonical_sha256_hex(&Value::Object(object_from(&backward))).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn edge_key_separates_endpoints(src in "[a-z]{1,8}", dst in "[a-z]{1,8}", kind in "[A-Z]{1,6}") {
        let attrs = Map::new();
        let forward = edge_key(&src, &dst, &kind, &attrs).unwrap();
        prop_assert_eq!(&forward, &edge_key(&src, &dst, &kind, &attrs).unwrap());
        if src != dst {
            prop_assert_ne!(forward, edge_key(&dst, &src, &kind, &attrs).unwrap());
        }
    }

    #[test]
    fn delta_parser_never_panics(text in "(\\PC{0,40}\n){0,6}") {
        let _ = GraphDelta::parse(&text);
    }

    #[test]
    fn parent_segments_are_never_safe(prefix in "[a-z]{0,6}", suffix in "[a-z]{0,6}") {
        let name = if prefix.is_empty() {
            format!("../{suffix}")
        } else {
            format!("{prefix}/../{suffix}")
        };
        prop_assert!(!is_safe_member_name(&name));
    }

    #[test]
    fn label_validation_matches_charset(label in "[A-Za-z0-9._ /-]{0,70}") {
        let expected = !label.is_empty()
            && label.len() <= 64
            && label.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        prop_assert_eq!(validate_label(&label).is_ok(), expected);
    }
}
