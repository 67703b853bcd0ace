// crates/fieldpack-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI i18n Tests
// Description: Unit tests for catalog lookups and placeholder substitution.
// Purpose: Ensure CLI messages stay well-formed.
// Dependencies: fieldpack-cli i18n module
// ============================================================================

//! ## Overview
//! Verifies catalog keys resolve, placeholders substitute, and unknown keys
//! fall back to the key text.

use crate::i18n::MessageArg;
use crate::i18n::catalog;
use crate::i18n::translate;

#[test]
fn catalog_templates_have_balanced_placeholders() {
    for (key, template) in catalog() {
        assert_eq!(
            template.matches('{').count(),
            template.matches('}').count(),
            "unbalanced placeholder in {key}"
        );
    }
}

#[test]
fn translate_substitutes_placeholders() {
    let output = translate(
        "input.read_failed",
        vec![
            MessageArg::new("kind", "graph delta"),
            MessageArg::new("path", "/tmp/delta.jsonl"),
            MessageArg::new("error", "denied"),
        ],
    );
    assert_eq!(output, "Failed to read graph delta at /tmp/delta.jsonl: denied");
}

#[test]
fn translate_falls_back_to_key() {
    assert_eq!(translate("no.such.key", Vec::new()), "no.such.key");
}

#[test]
fn macro_formats_named_arguments() {
    let output = crate::t!("main.version", version = "1.2.3");
    assert_eq!(output, "fieldpack 1.2.3");
}
