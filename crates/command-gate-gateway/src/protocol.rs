// crates/command-gate-gateway/src/protocol.rs
// ============================================================================
// Module: Gateway Wire Protocol
// Description: Inbound message parsing and outbound response framing.
// Purpose: Turn untrusted channel data into typed requests and typed replies.
// Dependencies: command-gate-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Inbound messages are JSON objects tagged with the gateway channel:
//! `{channel, method|type, id?, params|payload?, sessionToken?,
//! capabilityToken?, role?}`. Data that is not an object, or that carries a
//! different channel tag, is not addressed to this gateway and is ignored.
//! Addressed messages with a malformed envelope are answered with
//! `invalid-request`.
//!
//! Responses are `{channel, id, method, ok: true, result}` or
//! `{channel, id, method, ok: false, error: {code, message}}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use command_gate_core::DispatchErrorCode;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default protocol tag carried on every gateway message.
pub const DEFAULT_GATEWAY_CHANNEL: &str = "command-gate.gateway.v1";

/// Methods understood by the gateway.
pub const GATEWAY_METHODS: [&str; 3] = ["init", "list_tools", "call_tool"];

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    /// Origin not in the allow-list.
    OriginDenied,
    /// No capability token configured; `init` always fails.
    CapabilityTokenNotConfigured,
    /// `init` without a capability token.
    CapabilityTokenMissing,
    /// Capability token did not match.
    CapabilityTokenInvalid,
    /// Requested role is not `host` or `student`.
    InvalidRole,
    /// Authenticated call without a session token.
    SessionTokenMissing,
    /// Session token unknown or closed.
    SessionInvalid,
    /// Session token expired.
    SessionExpired,
    /// Session used from another origin.
    SessionOriginMismatch,
    /// Session used from another message source.
    SessionSourceMismatch,
    /// Live session bound reached.
    SessionLimitReached,
    /// Inbound message exceeds the size bound.
    MessageTooLarge,
    /// Addressed message with a malformed envelope.
    InvalidRequest,
    /// Method not understood.
    UnsupportedMethod,
    /// `call_tool` route not understood.
    UnsupportedToolRoute,
    /// Command route without a usable command id.
    InvalidCommandId,
    /// Command payload not JSON-safe.
    InvalidCommandPayload,
    /// Command metadata not a JSON-safe object.
    InvalidCommandMeta,
    /// Plugin route without a JSON-safe plugin value.
    InvalidPluginPayload,
    /// Command id not registered with the dispatch engine.
    UnregisteredTool,
    /// Plugin registration attempted by a non-host session.
    PluginRegisterForbiddenRole,
    /// No plugin loader configured.
    PluginLoaderUnavailable,
    /// Plugin loader failed.
    PluginRegisterFailed,
    /// Command result dropped entirely by sanitization.
    NonJsonSafeCommandResult,
    /// Dispatch engine failed outside its own failure taxonomy.
    CommandDispatchFailed,
    /// Unexpected failure inside the gateway handler.
    GatewayRuntimeError,
}

impl GatewayErrorCode {
    /// Returns the stable label for this code.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OriginDenied => "origin-denied",
            Self::CapabilityTokenNotConfigured => "capability-token-not-configured",
            Self::CapabilityTokenMissing => "capability-token-missing",
            Self::CapabilityTokenInvalid => "capability-token-invalid",
            Self::InvalidRole => "invalid-role",
            Self::SessionTokenMissing => "session-token-missing",
            Self::SessionInvalid => "session-invalid",
            Self::SessionExpired => "session-expired",
            Self::SessionOriginMismatch => "session-origin-mismatch",
            Self::SessionSourceMismatch => "session-source-mismatch",
            Self::SessionLimitReached => "session-limit-reached",
            Self::MessageTooLarge => "message-too-large",
            Self::InvalidRequest => "invalid-request",
            Self::UnsupportedMethod => "unsupported-method",
            Self::UnsupportedToolRoute => "unsupported-tool-route",
            Self::InvalidCommandId => "invalid-command-id",
            Self::InvalidCommandPayload => "invalid-command-payload",
            Self::InvalidCommandMeta => "invalid-command-meta",
            Self::InvalidPluginPayload => "invalid-plugin-payload",
            Self::UnregisteredTool => "unregistered-tool",
            Self::PluginRegisterForbiddenRole => "plugin-register-forbidden-role",
            Self::PluginLoaderUnavailable => "plugin-loader-unavailable",
            Self::PluginRegisterFailed => "plugin-register-failed",
            Self::NonJsonSafeCommandResult => "non-json-safe-command-result",
            Self::CommandDispatchFailed => "command-dispatch-failed",
            Self::GatewayRuntimeError => "gateway-runtime-error",
        }
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error answered to a gateway caller.
///
/// The code is a label: gateway codes, dispatch codes, and plugin loader
/// codes all surface through the same field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    /// Stable error label.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl GatewayError {
    /// Builds an error with a gateway code.
    #[must_use]
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.label().to_string(),
            message: message.into(),
        }
    }

    /// Builds an error carrying a dispatch engine code.
    #[must_use]
    pub fn dispatch(code: DispatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.label().to_string(),
            message: message.into(),
        }
    }

    /// Builds an error with an arbitrary label.
    #[must_use]
    pub fn labeled(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true when the error carries the given gateway code.
    #[must_use]
    pub fn is(&self, code: GatewayErrorCode) -> bool {
        self.code == code.label()
    }

    /// Renders the `{code, message}` error object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert("code".to_string(), Value::String(self.code.clone()));
        record.insert("message".to_string(), Value::String(self.message.clone()));
        Value::Object(record)
    }
}

// ============================================================================
// SECTION: Inbound
// ============================================================================

/// Parsed inbound gateway message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Request id (string, number, or null when absent).
    pub id: Value,
    /// Lower-cased method.
    pub method: String,
    /// Method parameters.
    pub params: Map<String, Value>,
    /// Session token from the message or its params.
    pub session_token: Option<String>,
    /// Capability token from the message or its params.
    pub capability_token: Option<String>,
    /// Requested role, unvalidated.
    pub role: Option<Value>,
}

/// Classification of inbound channel data.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Not addressed to this gateway; no response.
    Ignored,
    /// Addressed but malformed; answer `invalid-request`.
    Malformed {
        /// Request id when it could be read.
        id: Value,
        /// Method when it could be read.
        method: Option<String>,
        /// Reason for rejection.
        message: String,
    },
    /// Well-formed message.
    Message(InboundMessage),
}

/// Classifies and parses inbound channel data.
#[must_use]
pub fn parse_inbound(data: &Value, channel: &str) -> Inbound {
    let Some(object) = data.as_object() else {
        return Inbound::Ignored;
    };
    if object.get("channel").and_then(Value::as_str) != Some(channel) {
        return Inbound::Ignored;
    }
    let method = object
        .get("method")
        .or_else(|| object.get("type"))
        .and_then(Value::as_str)
        .map(|method| method.trim().to_ascii_lowercase())
        .filter(|method| !method.is_empty());
    let id = match object.get("id") {
        None | Some(Value::Null) => Value::Null,
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        Some(_) => {
            return Inbound::Malformed {
                id: Value::Null,
                method,
                message: "id must be a string or number".to_string(),
            };
        }
    };
    let Some(method) = method else {
        return Inbound::Malformed {
            id,
            method: None,
            message: "method must be a non-empty string".to_string(),
        };
    };
    let params = match object.get("params").or_else(|| object.get("payload")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => {
            return Inbound::Malformed {
                id,
                method: Some(method),
                message: "params must be an object".to_string(),
            };
        }
    };
    let session_token = string_field(object, &params, "sessionToken");
    let capability_token = string_field(object, &params, "capabilityToken");
    let role = object
        .get("role")
        .or_else(|| params.get("role"))
        .filter(|role| !role.is_null())
        .cloned();
    Inbound::Message(InboundMessage {
        id,
        method,
        params,
        session_token,
        capability_token,
        role,
    })
}

/// Reads a non-empty string from the message, falling back to its params.
fn string_field(object: &Map<String, Value>, params: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .or_else(|| params.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Renders a request id for audit records.
#[must_use]
pub fn request_id_label(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Outbound
// ============================================================================

/// Builds a success response.
#[must_use]
pub fn ok_response(channel: &str, id: &Value, method: &str, result: Value) -> Value {
    let mut record = envelope(channel, id, Some(method), true);
    record.insert("result".to_string(), result);
    Value::Object(record)
}

/// Builds an error response.
#[must_use]
pub fn error_response(channel: &str, id: &Value, method: Option<&str>, error: &GatewayError) -> Value {
    let mut record = envelope(channel, id, method, false);
    record.insert("error".to_string(), error.to_value());
    Value::Object(record)
}

/// Builds the shared response fields.
fn envelope(channel: &str, id: &Value, method: Option<&str>, ok: bool) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("channel".to_string(), Value::String(channel.to_string()));
    record.insert("id".to_string(), id.clone());
    record.insert(
        "method".to_string(),
        method.map_or(Value::Null, |method| Value::String(method.to_string())),
    );
    record.insert("ok".to_string(), Value::Bool(ok));
    record
}

// ============================================================================
// SECTION: Tests
// ============================================================================
