// crates/command-gate-core/src/runtime/engine/tests.rs
// ============================================================================
// Module: Dispatch Engine Tests
// Description: Unit tests for role resolution, correlation, and audit stages.
// Purpose: Pin the audit trail emitted by each pipeline path.
// Dependencies: command-gate-core, tokio
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use super::CommandBus;
use super::DispatchOptions;
use crate::audit::AuditEventType;
use crate::audit::CommandAuditEvent;
use crate::audit::CommandAuditSink;
use crate::audit::MemoryCommandAuditSink;
use crate::core::MutationScope;
use crate::core::Role;
use crate::interfaces::CommandError;
use crate::interfaces::ExecutionContext;
use crate::interfaces::FixedRole;
use crate::interfaces::ObjectPayload;
use crate::interfaces::RoleProvider;
use crate::interfaces::executor_fn;
use crate::runtime::registry::CommandDescriptor;

/// Executor that echoes the caller role.
fn whoami() -> CommandDescriptor {
    CommandDescriptor::new(
        "whoami",
        "Report the caller role",
        MutationScope::Doc,
        Arc::new(ObjectPayload),
        Arc::new(executor_fn(|_payload: Value, ctx: ExecutionContext| async move {
            Ok::<Value, CommandError>(json!({"role": ctx.role.as_str(), "correlation": ctx.correlation_id}))
        })),
    )
}

struct PanickingRole;

impl RoleProvider for PanickingRole {
    fn current_role(&self) -> Option<Role> {
        panic!("role lookup failed")
    }
}

struct PanickingSink;

impl CommandAuditSink for PanickingSink {
    fn record_command(&self, _event: &CommandAuditEvent) {
        panic!("sink offline")
    }
}

#[tokio::test]
async fn role_defaults_to_host() {
    let bus = CommandBus::default();
    bus.register(whoami()).unwrap();
    let result = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    assert_eq!(result.result().unwrap()["role"], "host");
}

#[tokio::test]
async fn role_provider_used_when_no_explicit_role() {
    let bus = CommandBus::builder().role_provider(Arc::new(FixedRole(Role::Student))).build();
    bus.register(whoami()).unwrap();
    let ambient = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    assert_eq!(ambient.result().unwrap()["role"], "student");
    let explicit = bus.dispatch("whoami", json!({}), DispatchOptions::new().with_role(Role::Host)).await;
    assert_eq!(explicit.result().unwrap()["role"], "host");
}

#[tokio::test]
async fn panicking_role_provider_falls_back_to_host() {
    let bus = CommandBus::builder().role_provider(Arc::new(PanickingRole)).build();
    bus.register(whoami()).unwrap();
    let result = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    assert_eq!(result.result().unwrap()["role"], "host");
}

#[tokio::test]
async fn correlation_id_is_idempotency_key_when_present() {
    let bus = CommandBus::default();
    bus.register(whoami()).unwrap();
    let keyed =
        bus.dispatch("whoami", json!({}), DispatchOptions::new().with_idempotency_key(" key-9 ")).await;
    assert_eq!(keyed.correlation_id, "key-9");
    assert_eq!(keyed.result().unwrap()["correlation"], "key-9");

    let first = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    let second = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    assert!(first.correlation_id.starts_with("dispatch-"));
    assert_ne!(first.correlation_id, second.correlation_id);
}

#[tokio::test]
async fn audit_trail_for_execution_and_unknown_command() {
    let sink = Arc::new(MemoryCommandAuditSink::new());
    let bus = CommandBus::builder().audit_sink(sink.clone()).build();
    bus.register(whoami()).unwrap();

    let mut meta = Map::new();
    meta.insert("source".to_string(), json!("toolbar"));
    meta.insert("apiKey".to_string(), json!("sk-live"));
    bus.dispatch("whoami", json!({}), DispatchOptions::new().with_meta(meta)).await;
    bus.dispatch("missing", json!({}), DispatchOptions::new()).await;

    assert_eq!(
        sink.event_types(),
        vec![
            AuditEventType::DispatchRequest,
            AuditEventType::DispatchExecuted,
            AuditEventType::DispatchRequest,
            AuditEventType::DispatchInvalidCommand,
        ]
    );
    let events = sink.events();
    assert_eq!(events[0].correlation_id, events[1].correlation_id);
    assert_eq!(events[0].metadata, json!({"source": "toolbar"}));
    assert_eq!(events[1].audit_tag.as_deref(), Some("whoami"));
    assert_eq!(events[1].mutation_scope, Some(MutationScope::Doc));
    assert_eq!(events[3].error.as_deref(), Some("unknown command 'missing'"));
}

#[tokio::test]
async fn panicking_audit_sink_does_not_break_dispatch() {
    let bus = CommandBus::builder().audit_sink(Arc::new(PanickingSink)).build();
    bus.register(whoami()).unwrap();
    let result = bus.dispatch("whoami", json!({}), DispatchOptions::new()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn blank_command_id_is_unknown() {
    let bus = CommandBus::default();
    let result = bus.dispatch("   ", json!({}), DispatchOptions::new()).await;
    let failure = result.failure().unwrap();
    assert_eq!(failure.code.label(), "unknown-command");
    assert_eq!(failure.message, "command id must be non-empty");
}

#[tokio::test]
async fn to_value_renders_success_shape() {
    let bus = CommandBus::default();
    bus.register(whoami()).unwrap();
    let result = bus.dispatch("whoami", json!({}), DispatchOptions::new().with_idempotency_key("k")).await;
    let rendered = result.to_value();
    assert_eq!(rendered["ok"], true);
    assert_eq!(rendered["code"], "executed");
    assert_eq!(rendered["commandId"], "whoami");
    assert_eq!(rendered["deduped"], false);
    assert_eq!(rendered["result"]["role"], "host");
}
