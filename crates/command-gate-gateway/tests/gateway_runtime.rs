// crates/command-gate-gateway/tests/gateway_runtime.rs
// ============================================================================
// Module: Gateway Runtime Tests
// Description: End-to-end coverage of init, list_tools, and call_tool.
// Purpose: Ensure authentication, session binding, and routing fail closed.
// ============================================================================

//! ## Overview
//! Drives [`GatewayRuntime::handle_message`] through the public API with a
//! manual clock, plus full channel round trips over the in-memory and
//! JSON-lines channels.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use command_gate_core::CommandBus;
use command_gate_core::CommandDescriptor;
use command_gate_core::CommandError;
use command_gate_core::ExecutionContext;
use command_gate_core::JsonSafetyLimits;
use command_gate_core::MutationScope;
use command_gate_core::ObjectPayload;
use command_gate_core::Role;
use command_gate_core::executor_fn;
use command_gate_gateway::GatewayOptions;
use command_gate_gateway::GatewayOutcome;
use command_gate_gateway::GatewayRuntime;
use command_gate_gateway::InMemoryChannel;
use command_gate_gateway::LinesChannel;
use command_gate_gateway::PluginContext;
use command_gate_gateway::PluginLoadError;
use command_gate_gateway::PluginLoader;
use command_gate_gateway::SourceId;
use command_gate_gateway::ToolCatalog;
use common::CAPABILITY_TOKEN;
use common::ORIGIN;
use common::error_code;
use common::harness;
use common::harness_with;
use common::message;
use common::options;
use common::register_counter;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::time::timeout;

const OTHER_ORIGIN: &str = "https://other.example";

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Loader that replies with a fixed outcome.
struct FixedLoader {
    outcome: Result<Value, PluginLoadError>,
}

#[async_trait]
impl PluginLoader for FixedLoader {
    async fn register(&self, plugin: Value, ctx: PluginContext) -> Result<Value, PluginLoadError> {
        assert_eq!(ctx.role, Role::Host);
        assert_eq!(ctx.origin, ORIGIN);
        self.outcome.clone().map(|result| json!({"loaded": plugin["id"], "detail": result}))
    }
}

/// Loader that panics.
struct PanickingLoader;

#[async_trait]
impl PluginLoader for PanickingLoader {
    async fn register(&self, plugin: Value, _ctx: PluginContext) -> Result<Value, PluginLoadError> {
        if plugin.is_null() {
            return Ok(Value::Null);
        }
        panic!("loader exploded");
    }
}

/// Catalog that panics while listing.
struct PanickingCatalog;

impl ToolCatalog for PanickingCatalog {
    fn commands(&self, _role: Role) -> Vec<Value> {
        panic!("catalog exploded");
    }
}

fn loader_harness(loader: Arc<dyn PluginLoader>) -> common::Harness {
    harness_with(options(), move |builder| builder.plugin_loader(loader))
}

// ============================================================================
// SECTION: End-to-End Scenarios
// ============================================================================

#[tokio::test]
async fn ping_round_trip_returns_command_result() {
    let h = harness();
    let token = h.init("host").await;
    let reply = h.call(&token, json!({"name": "command:ping"})).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["id"], json!(2));
    assert_eq!(reply["method"], json!("call_tool"));
    assert_eq!(reply["result"], json!({"route": "command", "commandId": "ping", "result": {"pong": true}}));
}

#[tokio::test]
async fn unregistered_command_is_reported_by_name() {
    let h = harness();
    let token = h.init("host").await;
    let reply = h.call(&token, json!({"name": "command", "arguments": {"commandId": "nope"}})).await;
    assert_eq!(error_code(&reply), "unregistered-tool");
    assert_eq!(reply["error"]["message"], json!("tool 'nope' is not registered with the command gateway"));
}

#[tokio::test]
async fn list_tools_describes_session_and_catalog() {
    let h = harness();
    let token = h.init("student").await;
    let reply = h.send(message("list_tools", 5, json!({"sessionToken": token}))).await;
    assert_eq!(reply["ok"], json!(true));
    let result = &reply["result"];
    assert_eq!(result["role"], json!("student"));
    assert_eq!(result["uiSlots"], json!(["toolbar", "sidebar"]));
    assert_eq!(result["capabilities"]["methods"], json!(["init", "list_tools", "call_tool"]));
    assert_eq!(result["capabilities"]["pluginRegistration"], json!(false));
    let commands = result["commands"].as_array().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["commandId"], json!("ping"));
    assert_eq!(commands[0]["requiresApproval"], json!(false));
}

// ============================================================================
// SECTION: Init
// ============================================================================

#[tokio::test]
async fn init_returns_token_role_and_expiry() {
    let h = harness();
    let reply = h.send(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN}))).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["result"]["role"], json!("host"));
    assert_eq!(reply["result"]["expiry"], json!(common::START_MS + 300_000));
    assert_eq!(reply["result"]["sessionToken"].as_str().unwrap().len(), 43);
    assert_eq!(h.runtime.session_count(), 1);
}

#[tokio::test]
async fn init_rejects_bad_credentials_and_roles() {
    let h = harness();
    let cases = [
        (json!({}), "capability-token-missing"),
        (json!({"capabilityToken": "  "}), "capability-token-missing"),
        (json!({"capabilityToken": "cap-wrong"}), "capability-token-invalid"),
        (json!({"capabilityToken": CAPABILITY_TOKEN, "role": "admin"}), "invalid-role"),
        (json!({"capabilityToken": CAPABILITY_TOKEN, "role": 1}), "invalid-role"),
    ];
    for (params, code) in cases {
        let reply = h.send(message("init", 1, params)).await;
        assert_eq!(error_code(&reply), code);
    }
    assert_eq!(h.runtime.session_count(), 0);
}

#[tokio::test]
async fn init_fails_closed_without_configured_token() {
    let h = harness_with(
        GatewayOptions {
            capability_token: String::new(),
            ..options()
        },
        |builder| builder,
    );
    let reply = h.send(message("init", 1, json!({"capabilityToken": ""}))).await;
    assert_eq!(error_code(&reply), "capability-token-not-configured");
}

#[tokio::test]
async fn init_from_unlisted_origin_is_denied() {
    let h = harness();
    let reply = h
        .send_from(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN})), OTHER_ORIGIN, &h.source)
        .await;
    assert_eq!(error_code(&reply), "origin-denied");
}

#[tokio::test]
async fn session_limit_is_enforced() {
    let h = harness_with(
        GatewayOptions {
            max_sessions: 1,
            ..options()
        },
        |builder| builder,
    );
    h.init("host").await;
    let reply = h.send(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN}))).await;
    assert_eq!(error_code(&reply), "session-limit-reached");
}

// ============================================================================
// SECTION: Session Binding
// ============================================================================

#[tokio::test]
async fn session_is_bound_to_origin() {
    let h = harness_with(
        GatewayOptions {
            allowed_origins: vec![ORIGIN.to_string(), OTHER_ORIGIN.to_string()],
            ..options()
        },
        |builder| builder,
    );
    let token = h.init("host").await;
    let list = message("list_tools", 3, json!({"sessionToken": token}));
    let reply = h.send_from(list.clone(), OTHER_ORIGIN, &h.source).await;
    assert_eq!(error_code(&reply), "session-origin-mismatch");
    let reply = h.send(list).await;
    assert_eq!(error_code(&reply), "session-invalid");
}

#[tokio::test]
async fn session_is_bound_to_source() {
    let h = harness();
    let token = h.init("host").await;
    let reply = h
        .send_from(message("list_tools", 3, json!({"sessionToken": token})), ORIGIN, &SourceId::new("frame-2"))
        .await;
    assert_eq!(error_code(&reply), "session-source-mismatch");
    assert_eq!(h.runtime.session_count(), 0);
}

#[tokio::test]
async fn session_expires_with_clock() {
    let h = harness();
    let token = h.init("host").await;
    h.clock.advance(299_999);
    let list = message("list_tools", 3, json!({"sessionToken": token}));
    assert_eq!(h.send(list.clone()).await["ok"], json!(true));
    h.clock.advance(1);
    let reply = h.send(list).await;
    assert_eq!(error_code(&reply), "session-expired");
    assert_eq!(h.runtime.session_count(), 0);
}

#[tokio::test]
async fn authenticated_methods_require_a_live_token() {
    let h = harness();
    let reply = h.send(message("list_tools", 3, json!({}))).await;
    assert_eq!(error_code(&reply), "session-token-missing");
    let reply = h.send(message("call_tool", 3, json!({"sessionToken": "forged", "name": "command:ping"}))).await;
    assert_eq!(error_code(&reply), "session-invalid");

    let token = h.init("host").await;
    assert!(h.runtime.close_session(&token));
    assert!(!h.runtime.close_session(&token));
    let reply = h.call(&token, json!({"name": "command:ping"})).await;
    assert_eq!(error_code(&reply), "session-invalid");
}

#[tokio::test]
async fn unknown_method_is_unsupported() {
    let h = harness();
    let reply = h.send(message("shutdown", 9, json!({}))).await;
    assert_eq!(error_code(&reply), "unsupported-method");
    assert_eq!(reply["method"], json!("shutdown"));
}

// ============================================================================
// SECTION: Command Route
// ============================================================================

#[tokio::test]
async fn keyed_calls_replay_through_the_gateway() {
    let h = harness();
    let calls = register_counter(&h.bus, "doc.bump");
    let token = h.init("host").await;
    let params = json!({"name": "command:doc.bump", "idempotencyKey": "k-1"});
    let first = h.call(&token, params.clone()).await;
    let second = h.call(&token, params).await;
    assert_eq!(first["result"]["result"], json!({"seen": 1}));
    assert!(first["result"].get("deduped").is_none());
    assert_eq!(second["result"]["result"], json!({"seen": 1}));
    assert_eq!(second["result"]["deduped"], json!(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatch_failures_surface_engine_codes() {
    let h = harness();
    h.bus
        .register(
            CommandDescriptor::new(
                "doc.publish",
                "Publishes a document",
                MutationScope::Doc,
                Arc::new(ObjectPayload),
                Arc::new(executor_fn(|_payload: Value, _ctx: ExecutionContext| async {
                    Ok::<Value, CommandError>(json!({"published": true}))
                })),
            )
            .with_approval(true),
        )
        .unwrap();
    let token = h.init("student").await;
    let reply = h.call(&token, json!({"name": "command:doc.publish"})).await;
    assert_eq!(error_code(&reply), "approval-policy-missing");
    let reply = h.call(&token, json!({"name": "command:ping", "payload": [1, 2]})).await;
    assert_eq!(error_code(&reply), "invalid-payload");
}

#[tokio::test]
async fn result_dropped_by_outbound_limits_is_reported() {
    let limits = JsonSafetyLimits {
        max_depth: 8,
        max_nodes: 0,
    };
    let h = harness_with(options(), move |builder| builder.result_limits(limits));
    let token = h.init("host").await;
    let reply = h.call(&token, json!({"name": "command:ping"})).await;
    assert_eq!(error_code(&reply), "non-json-safe-command-result");
    assert_eq!(reply["error"]["message"], json!("result of 'ping' is not JSON-safe"));
}

#[tokio::test]
async fn outbound_limits_trim_nested_result_fields() {
    let limits = JsonSafetyLimits {
        max_depth: 0,
        max_nodes: 16,
    };
    let h = harness_with(options(), move |builder| builder.result_limits(limits));
    let token = h.init("host").await;
    let reply = h.call(&token, json!({"name": "command:ping"})).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["result"]["result"], json!({}));
}

#[tokio::test]
async fn executor_results_are_sanitized() {
    let h = harness();
    h.bus
        .register(CommandDescriptor::new(
            "auth.whoami",
            "Reports the caller",
            MutationScope::Local,
            Arc::new(ObjectPayload),
            Arc::new(executor_fn(|_payload: Value, ctx: ExecutionContext| async move {
                Ok::<Value, CommandError>(json!({"role": ctx.role.as_str(), "accessToken": "leak"}))
            })),
        ))
        .unwrap();
    let token = h.init("student").await;
    let reply = h.call(&token, json!({"name": "command:auth.whoami"})).await;
    assert_eq!(reply["result"]["result"], json!({"role": "student"}));
}

#[tokio::test]
async fn malformed_tool_calls_are_rejected() {
    let h = harness();
    let token = h.init("host").await;
    let reply = h.call(&token, json!({"name": "shell.exec"})).await;
    assert_eq!(error_code(&reply), "unsupported-tool-route");
    let reply = h.call(&token, json!({"name": "command:ping", "meta": [1]})).await;
    assert_eq!(error_code(&reply), "invalid-command-meta");
}

// ============================================================================
// SECTION: Plugin Route
// ============================================================================

#[tokio::test]
async fn plugin_registration_requires_host_and_loader() {
    let h = harness();
    let student = h.init("student").await;
    let reply = h.call(&student, json!({"name": "plugin.register", "plugin": {"id": "p1"}})).await;
    assert_eq!(error_code(&reply), "plugin-register-forbidden-role");
    let host = h.init("host").await;
    let reply = h.call(&host, json!({"name": "plugin.register", "plugin": {"id": "p1"}})).await;
    assert_eq!(error_code(&reply), "plugin-loader-unavailable");
}

#[tokio::test]
async fn plugin_loader_result_is_returned() {
    let h = loader_harness(Arc::new(FixedLoader {
        outcome: Ok(json!({"version": 2})),
    }));
    let host = h.init("host").await;
    let reply = h.call(&host, json!({"name": "plugin.register", "manifest": {"id": "p1"}})).await;
    assert_eq!(
        reply["result"],
        json!({"route": "plugin.register", "result": {"loaded": "p1", "detail": {"version": 2}}})
    );
}

#[tokio::test]
async fn plugin_loader_failures_keep_their_code() {
    let h = loader_harness(Arc::new(FixedLoader {
        outcome: Err(PluginLoadError::new("manifest-invalid", "missing entry point")),
    }));
    let host = h.init("host").await;
    let reply = h.call(&host, json!({"name": "plugin.register", "plugin": {"id": "p1"}})).await;
    assert_eq!(error_code(&reply), "manifest-invalid");
    assert_eq!(reply["error"]["message"], json!("missing entry point"));

    let h = loader_harness(Arc::new(FixedLoader {
        outcome: Err(PluginLoadError::new("", "rejected")),
    }));
    let host = h.init("host").await;
    let reply = h.call(&host, json!({"name": "plugin.register", "plugin": {"id": "p1"}})).await;
    assert_eq!(error_code(&reply), "plugin-register-failed");
}

#[tokio::test]
async fn panicking_loader_is_contained() {
    let h = loader_harness(Arc::new(PanickingLoader));
    let host = h.init("host").await;
    let reply = h.call(&host, json!({"name": "plugin.register", "plugin": {"id": "p1"}})).await;
    assert_eq!(error_code(&reply), "plugin-register-failed");
    assert_eq!(h.runtime.session_count(), 1);
}

// ============================================================================
// SECTION: Containment and Audit
// ============================================================================

#[tokio::test]
async fn handler_panic_becomes_runtime_error() {
    let h = harness_with(options(), |builder| builder.catalog(Arc::new(PanickingCatalog)));
    let token = h.init("host").await;
    let reply = h.send(message("list_tools", 4, json!({"sessionToken": token}))).await;
    assert_eq!(error_code(&reply), "gateway-runtime-error");
    let reply = h.call(&token, json!({"name": "command:ping"})).await;
    assert_eq!(reply["ok"], json!(true));
}

#[tokio::test]
async fn audit_records_fingerprints_not_tokens() {
    let h = harness();
    let token = h.init("host").await;
    let _ = h.call(&token, json!({"name": "command:nope"})).await;
    h.clock.advance(300_000);
    let _ = h.send(message("list_tools", 3, json!({"sessionToken": token}))).await;

    let events = h.audit.events();
    let rendered = serde_json::to_string(&events).unwrap();
    assert!(!rendered.contains(&token));
    assert!(!rendered.contains(CAPABILITY_TOKEN));

    let outcomes: Vec<(&str, GatewayOutcome)> = events.iter().map(|event| (event.event, event.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            ("gateway_session", GatewayOutcome::Created),
            ("gateway_message", GatewayOutcome::Ok),
            ("gateway_message", GatewayOutcome::Error),
            ("gateway_session", GatewayOutcome::Expired),
            ("gateway_message", GatewayOutcome::Error),
        ]
    );
    assert_eq!(events[2].error_code.as_deref(), Some("unregistered-tool"));
    assert_eq!(events[4].error_code.as_deref(), Some("session-expired"));
}

// ============================================================================
// SECTION: Channels
// ============================================================================

#[tokio::test]
async fn in_memory_channel_round_trip_and_stop() {
    let h = harness();
    let channel = InMemoryChannel::new();
    let handle = h.runtime.start(&channel).unwrap();
    assert_eq!(channel.subscriber_count(), 1);

    let source = SourceId::new("tab-1");
    let reply = channel
        .request(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN})), ORIGIN, &source)
        .await
        .unwrap();
    let token = reply["result"]["sessionToken"].as_str().unwrap().to_string();
    let reply = channel
        .request(
            message("call_tool", 2, json!({"sessionToken": token, "name": "command:ping"})),
            ORIGIN,
            &source,
        )
        .await
        .unwrap();
    assert_eq!(reply["result"]["result"], json!({"pong": true}));
    assert!(channel.request(json!({"channel": "elsewhere"}), ORIGIN, &source).await.is_none());

    handle.stop().await;
    assert_eq!(channel.subscriber_count(), 0);
    assert_eq!(h.runtime.session_count(), 0);
    assert!(channel.request(message("init", 3, json!({})), ORIGIN, &source).await.is_none());
}

#[tokio::test]
async fn lines_channel_answers_each_frame_in_order() {
    let bus = Arc::new(CommandBus::default());
    common::register_ping(&bus);
    let runtime = Arc::new(GatewayRuntime::builder(bus, options()).build());

    let (mut input, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, mut output) = tokio::io::duplex(64 * 1024);
    let channel = LinesChannel::new(server_in, server_out);
    let handle = runtime.start(&channel).unwrap();

    let init = json!({"origin": ORIGIN, "data": message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN}))});
    let foreign = json!({"origin": ORIGIN, "data": {"channel": "elsewhere"}});
    let unknown = json!({"origin": ORIGIN, "data": message("bogus", 2, json!({}))});
    let frames = format!("{init}\nnot json\n{foreign}\n{unknown}\n");
    input.write_all(frames.as_bytes()).await.unwrap();
    input.shutdown().await.unwrap();
    drop(input);

    handle.wait().await;
    channel.flushed().await;
    let mut written = String::new();
    output.read_to_string(&mut written).await.unwrap();
    let replies: Vec<Value> = written.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], json!(1));
    assert_eq!(replies[0]["ok"], json!(true));
    assert_eq!(replies[1]["id"], json!(2));
    assert_eq!(replies[1]["error"]["code"], json!("unsupported-method"));
    assert_eq!(runtime.session_count(), 0);
}

/// Registers `slow`, which signals `entered` and then parks until `release`.
fn register_slow(bus: &CommandBus, entered: &Arc<Notify>, release: &Arc<Notify>) {
    let entered = Arc::clone(entered);
    let release = Arc::clone(release);
    bus.register(CommandDescriptor::new(
        "slow",
        "Waits for release",
        MutationScope::Local,
        Arc::new(ObjectPayload),
        Arc::new(executor_fn(move |_payload: Value, _ctx: ExecutionContext| {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            async move {
                entered.notify_one();
                release.notified().await;
                Ok::<Value, CommandError>(json!({"released": true}))
            }
        })),
    ))
    .unwrap();
}

#[tokio::test]
async fn suspended_command_does_not_block_other_sources() {
    let h = harness();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    register_slow(&h.bus, &entered, &release);
    let channel = Arc::new(InMemoryChannel::new());
    let handle = h.runtime.start(channel.as_ref()).unwrap();

    let busy = SourceId::new("tab-a");
    let init = channel
        .request(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN})), ORIGIN, &busy)
        .await
        .unwrap();
    let token = init["result"]["sessionToken"].as_str().unwrap().to_string();
    let slow_call = message("call_tool", 2, json!({"sessionToken": token, "name": "command:slow"}));
    let slow = tokio::spawn({
        let channel = Arc::clone(&channel);
        let busy = busy.clone();
        async move { channel.request(slow_call, ORIGIN, &busy).await }
    });
    entered.notified().await;

    let other = SourceId::new("tab-b");
    let other_init = timeout(
        Duration::from_secs(1),
        channel.request(message("init", 3, json!({"capabilityToken": CAPABILITY_TOKEN})), ORIGIN, &other),
    )
    .await
    .expect("init from another source must not wait for the suspended command")
    .unwrap();
    assert_eq!(other_init["ok"], json!(true));

    release.notify_one();
    let reply = slow.await.unwrap().unwrap();
    assert_eq!(reply["result"]["result"], json!({"released": true}));
    handle.stop().await;
}

#[tokio::test]
async fn messages_from_one_source_run_in_delivery_order() {
    let h = harness();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    register_slow(&h.bus, &entered, &release);
    let channel = Arc::new(InMemoryChannel::new());
    let handle = h.runtime.start(channel.as_ref()).unwrap();

    let source = SourceId::new("tab-a");
    let init = channel
        .request(message("init", 1, json!({"capabilityToken": CAPABILITY_TOKEN})), ORIGIN, &source)
        .await
        .unwrap();
    let token = init["result"]["sessionToken"].as_str().unwrap().to_string();
    let slow_call = message("call_tool", 2, json!({"sessionToken": token, "name": "command:slow"}));
    let slow = tokio::spawn({
        let channel = Arc::clone(&channel);
        let source = source.clone();
        async move { channel.request(slow_call, ORIGIN, &source).await }
    });
    entered.notified().await;

    let ping_call = message("call_tool", 3, json!({"sessionToken": token, "name": "command:ping"}));
    let mut ping = tokio::spawn({
        let channel = Arc::clone(&channel);
        let source = source.clone();
        async move { channel.request(ping_call, ORIGIN, &source).await }
    });
    assert!(timeout(Duration::from_millis(100), &mut ping).await.is_err(), "ping overtook the earlier message");

    release.notify_one();
    let slow_reply = slow.await.unwrap().unwrap();
    assert_eq!(slow_reply["id"], json!(2));
    let ping_reply = ping.await.unwrap().unwrap();
    assert_eq!(ping_reply["result"]["result"], json!({"pong": true}));
    handle.stop().await;
}
