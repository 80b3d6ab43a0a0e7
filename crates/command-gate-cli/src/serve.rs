// crates/command-gate-cli/src/serve.rs
// ============================================================================
// Module: Serve Wiring
// Description: Builds the gateway stack for `command-gate serve`.
// Purpose: Turn a validated config into a runtime with audit and built-ins.
// Dependencies: command-gate-config, command-gate-core, command-gate-gateway
// ============================================================================

//! ## Overview
//! `serve` hosts one [`GatewayRuntime`] over a stdio JSON-lines channel. This
//! module owns everything between the validated config and the running
//! runtime: audit sink selection, the built-in `ping` command, and operator
//! warnings. The binary only parses arguments and drives the channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use command_gate_config::AuditConfig;
use command_gate_config::AuditSinkKind;
use command_gate_config::CommandGateConfig;
use command_gate_core::CommandAuditSink;
use command_gate_core::CommandBus;
use command_gate_core::CommandDescriptor;
use command_gate_core::CommandError;
use command_gate_core::ExecutionContext;
use command_gate_core::MutationScope;
use command_gate_core::ObjectPayload;
use command_gate_core::RegistryError;
use command_gate_core::executor_fn;
use command_gate_gateway::FileAuditSink;
use command_gate_gateway::GatewayAuditSink;
use command_gate_gateway::GatewayOptions;
use command_gate_gateway::GatewayRuntime;
use command_gate_gateway::NoopAuditSink;
use command_gate_gateway::StderrAuditSink;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Id of the built-in liveness command.
pub const PING_COMMAND: &str = "ping";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures while assembling the gateway stack.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Audit sink could not be opened.
    #[error("audit sink unavailable: {0}")]
    AuditSink(String),
    /// Built-in command registration failed.
    #[error("built-in command registration failed: {0}")]
    Registry(#[from] RegistryError),
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// One sink shared by the gateway and the dispatch engine.
#[derive(Clone)]
pub struct AuditSinks {
    /// Gateway message and session events.
    pub gateway: Arc<dyn GatewayAuditSink>,
    /// Command lifecycle events.
    pub command: Arc<dyn CommandAuditSink>,
}

impl AuditSinks {
    /// Uses `sink` for both event streams.
    fn shared<S>(sink: S) -> Self
    where
        S: GatewayAuditSink + CommandAuditSink + 'static,
    {
        let sink = Arc::new(sink);
        Self {
            gateway: sink.clone(),
            command: sink,
        }
    }
}

/// Opens the audit sinks selected by `config`.
///
/// # Errors
///
/// Returns [`ServeError::AuditSink`] when the file sink cannot be opened.
pub fn audit_sinks(config: &AuditConfig) -> Result<AuditSinks, ServeError> {
    match (config.sink, config.path.as_deref()) {
        (AuditSinkKind::Stderr, _) => Ok(AuditSinks::shared(StderrAuditSink)),
        (AuditSinkKind::None, _) => Ok(AuditSinks::shared(NoopAuditSink)),
        (AuditSinkKind::File, Some(path)) => FileAuditSink::new(Path::new(path.trim()))
            .map(AuditSinks::shared)
            .map_err(|err| ServeError::AuditSink(err.to_string())),
        (AuditSinkKind::File, None) => Err(ServeError::AuditSink("audit.path is not set".to_string())),
    }
}

// ============================================================================
// SECTION: Built-in Commands
// ============================================================================

/// Registers the commands every served gateway exposes.
///
/// # Errors
///
/// Returns [`RegistryError`] when a descriptor is rejected.
pub fn register_builtin_commands(bus: &CommandBus) -> Result<(), RegistryError> {
    bus.register(
        CommandDescriptor::new(
            PING_COMMAND,
            "Liveness check; echoes the payload",
            MutationScope::Local,
            Arc::new(ObjectPayload),
            Arc::new(executor_fn(|payload: Value, ctx: ExecutionContext| async move {
                Ok::<Value, CommandError>(json!({
                    "pong": true,
                    "role": ctx.role.as_str(),
                    "echo": payload,
                }))
            })),
        )
        .with_schema(json!({"type": "object"})),
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Builds the gateway runtime described by `config`.
///
/// # Errors
///
/// Returns [`ServeError`] when audit sinks or built-ins cannot be set up.
pub fn build_runtime(config: &CommandGateConfig) -> Result<Arc<GatewayRuntime>, ServeError> {
    let sinks = audit_sinks(&config.audit)?;
    let bus = Arc::new(config.command_bus_builder().audit_sink(sinks.command).build());
    register_builtin_commands(&bus)?;
    let runtime = GatewayRuntime::builder(bus, config.gateway_options()).audit_sink(sinks.gateway).build();
    Ok(Arc::new(runtime))
}

/// Returns operator warnings for risky but valid settings.
#[must_use]
pub fn startup_warnings(options: &GatewayOptions) -> Vec<String> {
    let mut warnings = Vec::new();
    if options.allows_any_origin() {
        warnings.push(crate::t!("serve.warn.wildcard_origin"));
    }
    warnings
}
