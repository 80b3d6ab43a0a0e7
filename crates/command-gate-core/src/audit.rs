// crates/command-gate-core/src/audit.rs
// ============================================================================
// Module: Command Audit Events
// Description: Append-only audit events emitted by the dispatch pipeline.
// Purpose: Record every dispatch stage without storing events in the engine.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Each dispatch emits a sequence of [`CommandAuditEvent`]s linked by one
//! correlation id. Events are handed to a caller-installed
//! [`CommandAuditSink`]; the engine keeps no copy. Metadata is sanitized
//! before it reaches the sink, so credentials never land in audit logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

use crate::core::MutationScope;
use crate::core::Role;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Dispatch pipeline stage recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventType {
    /// Dispatch received.
    DispatchRequest,
    /// Command id empty or unregistered.
    DispatchInvalidCommand,
    /// Validator rejected the payload.
    DispatchInvalidPayload,
    /// Attempt handed to the approval queue.
    DispatchQueuedForApproval,
    /// Attempt requires approval and was not executed.
    DispatchApprovalRequired,
    /// Executor completed successfully.
    DispatchExecuted,
    /// Executor failed.
    DispatchExecutionFailed,
}

impl AuditEventType {
    /// Returns the stable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DispatchRequest => "dispatch-request",
            Self::DispatchInvalidCommand => "dispatch-invalid-command",
            Self::DispatchInvalidPayload => "dispatch-invalid-payload",
            Self::DispatchQueuedForApproval => "dispatch-queued-for-approval",
            Self::DispatchApprovalRequired => "dispatch-approval-required",
            Self::DispatchExecuted => "dispatch-executed",
            Self::DispatchExecutionFailed => "dispatch-execution-failed",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dispatch audit event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Pipeline stage.
    pub event_type: AuditEventType,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
    /// Correlation id shared by all events of one dispatch.
    pub correlation_id: String,
    /// Command id as requested.
    pub command_id: String,
    /// Effective role.
    pub role: Role,
    /// Command audit tag, once the command is resolved.
    pub audit_tag: Option<String>,
    /// Command mutation scope, once the command is resolved.
    pub mutation_scope: Option<MutationScope>,
    /// Sanitized metadata.
    pub metadata: Value,
    /// Failure detail for failure stages.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Receiver for dispatch audit events. Implementations must not block for long.
pub trait CommandAuditSink: Send + Sync {
    /// Records one event.
    fn record_command(&self, event: &CommandAuditEvent);
}

/// Sink that discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCommandAuditSink;

impl CommandAuditSink for NoopCommandAuditSink {
    fn record_command(&self, _event: &CommandAuditEvent) {}
}

/// Sink that keeps events in memory, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryCommandAuditSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<CommandAuditEvent>>,
}

impl MemoryCommandAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<CommandAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events().iter().map(|event| event.event_type).collect()
    }
}

impl CommandAuditSink for MemoryCommandAuditSink {
    fn record_command(&self, event: &CommandAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
