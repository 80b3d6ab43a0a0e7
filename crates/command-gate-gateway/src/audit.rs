// crates/command-gate-gateway/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for gateway message handling.
// Purpose: Emit redacted JSON-line audit logs for gateway and dispatch events.
// Dependencies: command-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Gateway events record each handled message and each session lifecycle
//! change. Session tokens appear only as SHA-256 fingerprints. The stderr and
//! file sinks also implement [`CommandAuditSink`] so one sink can serve the
//! gateway and the dispatch engine together.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use command_gate_core::CommandAuditEvent;
use command_gate_core::CommandAuditSink;
use command_gate_core::Role;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome recorded by a gateway audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    /// Message answered successfully.
    Ok,
    /// Message answered with an error.
    Error,
    /// Session established.
    Created,
    /// Session closed explicitly or by mismatch.
    Closed,
    /// Session expired.
    Expired,
}

/// Gateway audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier (`gateway_message` or `gateway_session`).
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
    /// Lower-cased method, when known.
    pub method: Option<String>,
    /// Message origin.
    pub origin: String,
    /// Request identifier rendered as text, when provided.
    pub request_id: Option<String>,
    /// Outcome.
    pub outcome: GatewayOutcome,
    /// Error code for failed messages.
    pub error_code: Option<String>,
    /// Session role, when a session was resolved.
    pub role: Option<Role>,
    /// SHA-256 fingerprint of the session token.
    pub session_fingerprint: Option<String>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait GatewayAuditSink: Send + Sync {
    /// Records a gateway event.
    fn record_gateway(&self, event: &GatewayAuditEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event line.
    fn write_line<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl GatewayAuditSink for StderrAuditSink {
    fn record_gateway(&self, event: &GatewayAuditEvent) {
        Self::write_line(event);
    }
}

impl CommandAuditSink for StderrAuditSink {
    fn record_command(&self, event: &CommandAuditEvent) {
        Self::write_line(event);
    }
}

/// Audit sink that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event line.
    fn write_line<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl GatewayAuditSink for FileAuditSink {
    fn record_gateway(&self, event: &GatewayAuditEvent) {
        self.write_line(event);
    }
}

impl CommandAuditSink for FileAuditSink {
    fn record_command(&self, event: &CommandAuditEvent) {
        self.write_line(event);
    }
}

/// No-op audit sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record_gateway(&self, _event: &GatewayAuditEvent) {}
}

impl CommandAuditSink for NoopAuditSink {
    fn record_command(&self, _event: &CommandAuditEvent) {}
}

/// Audit sink that keeps gateway events in memory.
#[derive(Debug, Default)]
pub struct MemoryGatewayAuditSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<GatewayAuditEvent>>,
}

impl MemoryGatewayAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<GatewayAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl GatewayAuditSink for MemoryGatewayAuditSink {
    fn record_gateway(&self, event: &GatewayAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
