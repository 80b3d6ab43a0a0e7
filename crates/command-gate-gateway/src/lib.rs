// crates/command-gate-gateway/src/lib.rs
// ============================================================================
// Module: Command Gate Gateway Library
// Description: Message-channel gateway over the Command Gate dispatch engine.
// Purpose: Authenticate callers, bind sessions, and route tool calls.
// Dependencies: command-gate-core, tokio, serde_json
// ============================================================================

//! ## Overview
//! The gateway terminates a small JSON protocol (`init`, `list_tools`,
//! `call_tool`) over any [`MessageChannel`]. Callers prove possession of a
//! capability token once, receive a session token bound to their origin and
//! source, and then list or call commands registered with a
//! [`command_gate_core::CommandBus`].
//!
//! Security posture: every inbound message is untrusted and every failure is
//! answered as a structured error; see [`runtime`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod channel;
pub mod plugin;
pub mod protocol;
pub mod runtime;
pub mod security;
pub mod session;
pub mod stdio;
pub mod tools;
pub mod wiring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::GatewayAuditEvent;
pub use audit::GatewayAuditSink;
pub use audit::GatewayOutcome;
pub use audit::MemoryGatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use catalog::RegistryCatalog;
pub use catalog::ToolCatalog;
pub use channel::ChannelError;
pub use channel::ChannelEvent;
pub use channel::InMemoryChannel;
pub use channel::MessageChannel;
pub use channel::Responder;
pub use channel::SourceId;
pub use channel::Subscription;
pub use plugin::PluginContext;
pub use plugin::PluginLoadError;
pub use plugin::PluginLoader;
pub use protocol::DEFAULT_GATEWAY_CHANNEL;
pub use protocol::GatewayError;
pub use protocol::GatewayErrorCode;
pub use runtime::GatewayHandle;
pub use runtime::GatewayOptions;
pub use runtime::GatewayRuntime;
pub use runtime::GatewayRuntimeBuilder;
pub use stdio::LinesChannel;
pub use stdio::StdioChannel;
pub use tools::ToolRoute;
pub use wiring::reset_shared_command_bus;
pub use wiring::shared_command_bus;
