// crates/command-gate-core/src/core/json_safety/tests.rs
// ============================================================================
// Module: JSON Safety Tests
// Description: Unit tests for bounded sanitization and secret scrubbing.
// Purpose: Validate omission paths for depth, node, and credential limits.
// Dependencies: command-gate-core
// ============================================================================

//! ## Overview
//! Covers the scrubbing rules applied to values crossing a trust boundary.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use serde_json::Value;
use serde_json::json;

use super::JsonSafetyLimits;
use super::is_json_safe;
use super::is_json_safe_with_limits;
use super::is_secret_key;
use super::sanitize;
use super::sanitize_with_limits;

/// Builds an array nested `levels` deep around a scalar.
fn nested(levels: usize) -> Value {
    let mut value = json!(1);
    for _ in 0 .. levels {
        value = json!([value]);
    }
    value
}

#[test]
fn clean_values_pass_through_unchanged() {
    let value = json!({"a": [1, 2.5, "x", null, true], "b": {"c": "d"}});
    let result = sanitize(&value, "payload");
    assert!(result.is_clean());
    assert_eq!(result.value, Some(value));
}

#[test]
fn secret_keys_are_dropped_and_recorded() {
    let value = json!({"apiKey": "k", "nested": {"refresh_token": "r", "keep": 1}, "list": [{"Password": "p"}]});
    let result = sanitize(&value, "payload");
    assert_eq!(result.value, Some(json!({"nested": {"keep": 1}, "list": [{}]})));
    let mut paths = result.scrubbed_paths;
    paths.sort();
    assert_eq!(paths, vec!["payload.apiKey", "payload.list[0].Password", "payload.nested.refresh_token"]);
}

#[test]
fn secret_key_matching_ignores_case_and_separators() {
    for key in ["apikey", "API_KEY", "api-key", "Access.Token", "credentials", "SECRET"] {
        assert!(is_secret_key(key), "{key} should be secret");
    }
    for key in ["tokens_used", "keyboard", "author", "secretary"] {
        assert!(!is_secret_key(key), "{key} should not be secret");
    }
}

#[test]
fn depth_bound_omits_deep_values() {
    let within = nested(8);
    assert!(sanitize(&within, "v").is_clean());
    assert!(is_json_safe(&within));

    let beyond = nested(9);
    let result = sanitize(&beyond, "v");
    assert_eq!(result.scrubbed_paths, vec!["v[0][0][0][0][0][0][0][0][0]"]);
    assert!(!is_json_safe(&beyond));
}

#[test]
fn node_bound_omits_trailing_siblings() {
    let limits = JsonSafetyLimits {
        max_depth: 8,
        max_nodes: 4,
    };
    let value = json!([1, 2, 3, 4, 5]);
    let result = sanitize_with_limits(&value, "v", limits);
    assert_eq!(result.value, Some(json!([1, 2, 3])));
    assert_eq!(result.scrubbed_paths, vec!["v[3]"]);
    assert!(!is_json_safe_with_limits(&value, limits));
}

#[test]
fn oversized_array_records_one_path_past_the_node_bound() {
    let value = Value::Array((0 .. 200_000).map(|index| json!(index)).collect());
    let result = sanitize(&value, "payload");
    assert_eq!(result.scrubbed_paths, vec!["payload[1023]"]);
    assert_eq!(result.value.unwrap().as_array().unwrap().len(), 1023);
}

#[test]
fn node_bound_stops_enclosing_containers() {
    let limits = JsonSafetyLimits {
        max_depth: 8,
        max_nodes: 3,
    };
    let value = json!({"a": [1, 2, 3], "b": {"token": "t"}, "c": 4});
    let result = sanitize_with_limits(&value, "v", limits);
    assert_eq!(result.value, Some(json!({"a": [1]})));
    assert_eq!(result.scrubbed_paths, vec!["v.a[1]"]);
}

#[test]
fn oversized_root_is_omitted_entirely() {
    let limits = JsonSafetyLimits {
        max_depth: 0,
        max_nodes: 0,
    };
    let result = sanitize_with_limits(&json!({"a": 1}), "root", limits);
    assert_eq!(result.value, None);
    assert_eq!(result.scrubbed_paths, vec!["root"]);
    assert_eq!(result.into_value_or_null(), Value::Null);
}

#[test]
fn empty_base_path_uses_bare_keys() {
    let result = sanitize(&json!({"token": "t"}), "");
    assert_eq!(result.scrubbed_paths, vec!["token"]);
}
