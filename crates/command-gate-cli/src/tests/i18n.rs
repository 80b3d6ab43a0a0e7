// crates/command-gate-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Catalog Tests
// Description: Unit tests for the message catalog.
// Purpose: Ensure lookups and placeholder substitution stay predictable.
// Dependencies: command-gate-cli i18n module
// ============================================================================

use crate::i18n::CATALOG_ITEMS;
use crate::i18n::MessageArg;
use crate::i18n::catalog;
use crate::i18n::translate;

#[test]
fn catalog_keys_are_unique() {
    assert_eq!(catalog().len(), CATALOG_ITEMS.len(), "duplicate catalog key");
    assert!(catalog().contains_key("config.check.ok"));
}

#[test]
fn translate_substitutes_placeholders() {
    let output = translate(
        "input.read_too_large",
        vec![
            MessageArg::new("path", "envelope.json"),
            MessageArg::new("size", "70000"),
            MessageArg::new("limit", "65536"),
        ],
    );
    assert_eq!(output, "Refusing to read envelope.json because it is 70000 bytes (limit 65536).");
}

#[test]
fn missing_key_falls_back_to_key() {
    assert_eq!(translate("no.such.key", Vec::new()), "no.such.key");
}

#[test]
fn macro_formats_named_arguments() {
    let output = crate::t!("config.load_failed", error = "boom");
    assert_eq!(output, "Failed to load config: boom");
}
