// crates/command-gate-gateway/tests/common/mod.rs
// ============================================================================
// Module: Gateway Test Fixtures
// Description: Shared harness for gateway integration tests.
// Purpose: Build a runtime with a manual clock and send protocol messages.
// ============================================================================

//! Shared fixtures for gateway integration tests.

#![allow(dead_code, reason = "Not every test file uses every fixture.")]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use command_gate_core::CommandBus;
use command_gate_core::CommandDescriptor;
use command_gate_core::CommandError;
use command_gate_core::ExecutionContext;
use command_gate_core::ManualClock;
use command_gate_core::MutationScope;
use command_gate_core::ObjectPayload;
use command_gate_core::executor_fn;
use command_gate_gateway::DEFAULT_GATEWAY_CHANNEL;
use command_gate_gateway::GatewayOptions;
use command_gate_gateway::GatewayRuntime;
use command_gate_gateway::GatewayRuntimeBuilder;
use command_gate_gateway::MemoryGatewayAuditSink;
use command_gate_gateway::SourceId;
use serde_json::Value;
use serde_json::json;

/// Allowed origin used by the harness.
pub const ORIGIN: &str = "https://app.example";

/// Capability token configured on the harness runtime.
pub const CAPABILITY_TOKEN: &str = "cap-7f3a";

/// Start time of the manual clock.
pub const START_MS: u64 = 1_700_000_000_000;

/// Gateway under test plus its collaborators.
pub struct Harness {
    /// Runtime under test.
    pub runtime: Arc<GatewayRuntime>,
    /// Bus behind the runtime.
    pub bus: Arc<CommandBus>,
    /// Manual clock shared by bus and runtime.
    pub clock: Arc<ManualClock>,
    /// Recorded gateway audit events.
    pub audit: Arc<MemoryGatewayAuditSink>,
    /// Default message source.
    pub source: SourceId,
}

/// Gateway options used by the harness.
pub fn options() -> GatewayOptions {
    GatewayOptions {
        allowed_origins: vec![ORIGIN.to_string()],
        capability_token: CAPABILITY_TOKEN.to_string(),
        ui_slots: vec!["toolbar".to_string(), " toolbar ".to_string(), "sidebar".to_string()],
        ..GatewayOptions::default()
    }
}

/// Builds a harness with a `ping` command registered.
pub fn harness() -> Harness {
    harness_with(options(), |builder| builder)
}

/// Builds a harness with custom options and builder tweaks.
pub fn harness_with(
    options: GatewayOptions,
    configure: impl FnOnce(GatewayRuntimeBuilder) -> GatewayRuntimeBuilder,
) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let bus = Arc::new(CommandBus::builder().clock(clock.clone()).build());
    register_ping(&bus);
    let audit = Arc::new(MemoryGatewayAuditSink::new());
    let builder = GatewayRuntime::builder(Arc::clone(&bus), options).clock(clock.clone()).audit_sink(audit.clone());
    Harness {
        runtime: Arc::new(configure(builder).build()),
        bus,
        clock,
        audit,
        source: SourceId::new("frame-1"),
    }
}

/// Registers `ping`, which replies `{pong: true}`.
pub fn register_ping(bus: &CommandBus) {
    bus.register(CommandDescriptor::new(
        "ping",
        "Replies with pong",
        MutationScope::Local,
        Arc::new(ObjectPayload),
        Arc::new(executor_fn(|_payload: Value, _ctx: ExecutionContext| async {
            Ok::<Value, CommandError>(json!({"pong": true}))
        })),
    ))
    .unwrap();
}

/// Registers a command that counts its executions.
pub fn register_counter(bus: &CommandBus, id: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    bus.register(CommandDescriptor::new(
        id,
        "Counts executions",
        MutationScope::Sync,
        Arc::new(ObjectPayload),
        Arc::new(executor_fn(move |_payload: Value, _ctx: ExecutionContext| {
            let counter = Arc::clone(&counter);
            async move {
                let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<Value, CommandError>(json!({"seen": seen}))
            }
        })),
    ))
    .unwrap();
    calls
}

/// Builds a protocol message.
pub fn message(method: &str, id: u64, params: Value) -> Value {
    json!({
        "channel": DEFAULT_GATEWAY_CHANNEL,
        "id": id,
        "method": method,
        "params": params,
    })
}

impl Harness {
    /// Sends a message from the harness origin and source.
    pub async fn send(&self, data: Value) -> Value {
        self.send_from(data, ORIGIN, &self.source).await
    }

    /// Sends a message from an explicit origin and source.
    pub async fn send_from(&self, data: Value, origin: &str, source: &SourceId) -> Value {
        self.runtime.handle_message(&data, origin, source).await.unwrap()
    }

    /// Opens a session with the given role and returns its token.
    pub async fn init(&self, role: &str) -> String {
        let reply = self
            .send(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN, "role": role})))
            .await;
        assert_eq!(reply["ok"], json!(true), "init failed: {reply}");
        reply["result"]["sessionToken"].as_str().unwrap().to_string()
    }

    /// Sends `call_tool` with a session token.
    pub async fn call(&self, token: &str, params: Value) -> Value {
        let mut params = params;
        params["sessionToken"] = json!(token);
        self.send(message("call_tool", 2, params)).await
    }
}

/// Returns the error code of a reply.
pub fn error_code(reply: &Value) -> &str {
    assert_eq!(reply["ok"], json!(false), "expected failure: {reply}");
    reply["error"]["code"].as_str().unwrap()
}
