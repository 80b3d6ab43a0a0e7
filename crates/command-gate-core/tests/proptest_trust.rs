//! Trust-boundary property-based tests.
//!
//! ## Purpose
//! These tests generate arbitrary JSON values, handshake mutations, and
//! adapter ids to ensure the sanitizer, handshake validator, and sandbox
//! policy hold their contracts on every input, not just curated fixtures.
//!
//! ## What is covered
//! - Sanitizing a bounded, secret-free value is the identity.
//! - Secret-named keys never survive sanitization.
//! - Each single-field handshake mutation is rejected with its own code.
//! - Non-local adapters are always allowed; local adapters without a
//!   handshake are always denied.
// crates/command-gate-core/tests/proptest_trust.rs
// ============================================================================
// Module: Trust Boundary Property-Based Tests
// Description: Property checks for sanitizer, handshake, and sandbox policy.
// Purpose: Ensure trust-boundary decisions hold for generated inputs.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use command_gate_core::HandshakeErrorCode;
use command_gate_core::HandshakeSeed;
use command_gate_core::Role;
use command_gate_core::SandboxPolicy;
use command_gate_core::SandboxReason;
use command_gate_core::SandboxRequest;
use command_gate_core::core::handshake::create;
use command_gate_core::core::handshake::validate;
use command_gate_core::core::json_safety::is_secret_key;
use command_gate_core::is_json_safe;
use command_gate_core::sanitize;
use proptest::prelude::*;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Strategies
// ============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z_]{1,10}".prop_filter("secret-shaped key", |key| !is_secret_key(key))
}

fn json_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e9f64 .. 1.0e9f64).prop_map(|n| json!(n)),
        "[ -~]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0 .. 4).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0 .. 4)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

fn valid_handshake() -> Value {
    create(
        HandshakeSeed {
            session_id: Some("sess-prop".to_string()),
            adapter_id: "local.fs".to_string(),
            tool_id: Some("read".to_string()),
            role: Role::Student,
            ttl_ms: Some(60_000),
            metadata: Some(json!({"lesson": 4})),
        },
        1_000,
    )
    .unwrap()
    .to_value()
}

/// Applies one single-field mutation and returns the code it must produce.
fn mutate(envelope: &mut Value, mutation: usize, junk: &str) -> HandshakeErrorCode {
    let object = envelope.as_object_mut().unwrap();
    match mutation {
        0 => {
            object.insert("protocol".to_string(), json!(format!("x-{junk}")));
            HandshakeErrorCode::ProtocolMismatch
        }
        1 => {
            object.insert("sessionId".to_string(), json!("   "));
            HandshakeErrorCode::MissingSessionId
        }
        2 => {
            object.remove("adapterId");
            HandshakeErrorCode::MissingAdapterId
        }
        3 => {
            object.insert("toolId".to_string(), json!(7));
            HandshakeErrorCode::InvalidToolId
        }
        4 => {
            object.insert("role".to_string(), json!(format!("admin-{junk}")));
            HandshakeErrorCode::InvalidRole
        }
        5 => {
            object.insert("issuedAt".to_string(), json!(junk));
            HandshakeErrorCode::InvalidIssuedAt
        }
        6 => {
            object.insert("expiresAt".to_string(), json!(-5));
            HandshakeErrorCode::InvalidExpiresAt
        }
        7 => {
            let issued = object.get("issuedAt").cloned().unwrap();
            object.insert("expiresAt".to_string(), issued);
            HandshakeErrorCode::ExpiryNotAfterIssue
        }
        _ => {
            let mut deep = json!(junk);
            for _ in 0 .. 12 {
                deep = json!([deep]);
            }
            object.insert("metadata".to_string(), deep);
            HandshakeErrorCode::InvalidMetadata
        }
    }
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn sanitize_is_identity_on_safe_values(value in json_value_strategy()) {
        prop_assert!(is_json_safe(&value));
        let sanitized = sanitize(&value, "value");
        prop_assert!(sanitized.is_clean());
        prop_assert_eq!(sanitized.value, Some(value));
    }

    #[test]
    fn api_key_never_survives(value in json_value_strategy(), secret in "[a-z0-9]{1,24}") {
        let mut record = Map::new();
        record.insert("data".to_string(), value);
        record.insert("apiKey".to_string(), Value::String(secret));
        let sanitized = sanitize(&Value::Object(record), "");
        let output = sanitized.value.clone().unwrap();
        prop_assert!(output.get("apiKey").is_none());
        prop_assert!(output.get("data").is_some());
        prop_assert!(sanitized.scrubbed_paths.contains(&"apiKey".to_string()));
    }

    #[test]
    fn handshake_single_field_mutations_are_rejected(mutation in 0usize .. 9, junk in "[a-z]{1,8}") {
        let mut envelope = valid_handshake();
        prop_assert!(validate(&envelope).is_ok());
        let expected = mutate(&mut envelope, mutation, &junk);
        let err = validate(&envelope).unwrap_err();
        prop_assert_eq!(err.code, expected);
        prop_assert!(err.path.starts_with("handshake."));
    }

    #[test]
    fn non_local_adapters_are_always_allowed(
        adapter in "[a-k][a-z0-9.]{0,16}",
        tool in "[a-z]{1,8}",
        handshake in prop::option::of(json_value_strategy()),
        now_ms in any::<u64>()
    ) {
        let decision = SandboxPolicy::default().decide(&SandboxRequest {
            adapter_id: &adapter,
            tool_id: &tool,
            role: Some(Role::Student),
            handshake: handshake.as_ref(),
            now_ms,
        });
        prop_assert_eq!(decision.reason(), SandboxReason::AllowedNonLocalAdapter);
        prop_assert!(decision.is_allowed());
    }

    #[test]
    fn local_adapters_without_handshake_are_denied(
        prefix in prop::sample::select(vec!["local.", "local:", "local/", "LOCAL."]),
        rest in "[a-z0-9]{1,12}",
        tool in "[a-z]{1,8}",
        now_ms in any::<u64>()
    ) {
        let adapter = format!("{prefix}{rest}");
        let decision = SandboxPolicy::default().decide(&SandboxRequest {
            adapter_id: &adapter,
            tool_id: &tool,
            role: None,
            handshake: None,
            now_ms,
        });
        prop_assert_eq!(decision.reason(), SandboxReason::MissingHandshake);
        prop_assert!(!decision.is_allowed());
    }
}
