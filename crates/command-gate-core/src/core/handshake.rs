// crates/command-gate-core/src/core/handshake.rs
// ============================================================================
// Module: Handshake Envelope
// Description: Time-bounded credential binding an adapter, optional tool, and role.
// Purpose: Issue and validate the credential required for local adapter invocations.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A trusted issuer creates a [`HandshakeEnvelope`] with [`create`]; any
//! consumer validates an untrusted candidate with [`validate`]. Creation
//! normalizes its inputs so the result always passes validation. Validation
//! is strict: every rejection has its own [`HandshakeErrorCode`] and the
//! dotted path of the offending field.
//!
//! Expiry is always computed against a caller-supplied `now`; the envelope
//! carries no clock of its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::Role;
use crate::core::identifiers::normalize_optional;
use crate::core::ids::random_hex;
use crate::core::json_safety::is_json_safe;
use crate::core::json_safety::sanitize;
use crate::core::time::SharedClock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol tag every envelope must carry.
pub const HANDSHAKE_PROTOCOL: &str = "command-gate.handshake.v1";
/// Default envelope lifetime (5 minutes).
pub const DEFAULT_HANDSHAKE_TTL_MS: u64 = 5 * 60 * 1000;
/// Maximum envelope lifetime (24 hours).
pub const MAX_HANDSHAKE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Random bytes in a generated session id.
const SESSION_ID_BYTES: usize = 16;
/// Root path used in validation errors.
const ROOT_PATH: &str = "handshake";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Time-bounded credential for one adapter (and optionally one tool).
///
/// # Invariants
/// - `protocol == HANDSHAKE_PROTOCOL`.
/// - `session_id` and `adapter_id` are trimmed and non-empty.
/// - `expires_at > issued_at`.
/// - `metadata`, when present, is JSON-safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeEnvelope {
    /// Protocol tag.
    pub protocol: String,
    /// Session identifier for audit correlation.
    pub session_id: String,
    /// Adapter this envelope authorizes.
    pub adapter_id: String,
    /// Tool this envelope is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    /// Role the holder acts as.
    pub role: Role,
    /// Issue time in unix milliseconds.
    pub issued_at: u64,
    /// Expiry time in unix milliseconds.
    pub expires_at: u64,
    /// Optional sanitized metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl HandshakeEnvelope {
    /// Returns true when the envelope is expired at `now_ms`.
    #[must_use]
    pub const fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Returns the remaining lifetime at `now_ms` (zero once expired).
    #[must_use]
    pub const fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now_ms))
    }

    /// Serializes the envelope into its wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("protocol".to_string(), Value::String(self.protocol.clone()));
        map.insert("sessionId".to_string(), Value::String(self.session_id.clone()));
        map.insert("adapterId".to_string(), Value::String(self.adapter_id.clone()));
        if let Some(tool_id) = &self.tool_id {
            map.insert("toolId".to_string(), Value::String(tool_id.clone()));
        }
        map.insert("role".to_string(), Value::String(self.role.as_str().to_string()));
        map.insert("issuedAt".to_string(), Value::from(self.issued_at));
        map.insert("expiresAt".to_string(), Value::from(self.expires_at));
        if let Some(metadata) = &self.metadata {
            map.insert("metadata".to_string(), metadata.clone());
        }
        Value::Object(map)
    }
}

/// Issuer input for [`create`].
#[derive(Debug, Clone, Default)]
pub struct HandshakeSeed {
    /// Session id; generated when absent or blank.
    pub session_id: Option<String>,
    /// Adapter identifier (required).
    pub adapter_id: String,
    /// Optional tool restriction.
    pub tool_id: Option<String>,
    /// Holder role.
    pub role: Role,
    /// Requested lifetime; defaults to five minutes, clamped to 24 hours.
    pub ttl_ms: Option<u64>,
    /// Optional metadata; sanitized before it is embedded.
    pub metadata: Option<Value>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable rejection codes for handshake creation and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErrorCode {
    /// Candidate is not a JSON object.
    NotObject,
    /// Protocol tag missing or different.
    ProtocolMismatch,
    /// Session id missing or blank.
    MissingSessionId,
    /// Adapter id missing or blank.
    MissingAdapterId,
    /// Tool id present but not a string.
    InvalidToolId,
    /// Role outside `host`/`student`.
    InvalidRole,
    /// Issue time missing or not a non-negative integer.
    InvalidIssuedAt,
    /// Expiry time missing or not a non-negative integer.
    InvalidExpiresAt,
    /// Expiry does not come after issue.
    ExpiryNotAfterIssue,
    /// Metadata exceeds the JSON-safety bounds.
    InvalidMetadata,
}

impl HandshakeErrorCode {
    /// Returns the stable label for this code.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotObject => "handshake-not-object",
            Self::ProtocolMismatch => "handshake-protocol-mismatch",
            Self::MissingSessionId => "handshake-missing-session-id",
            Self::MissingAdapterId => "handshake-missing-adapter-id",
            Self::InvalidToolId => "handshake-invalid-tool-id",
            Self::InvalidRole => "handshake-invalid-role",
            Self::InvalidIssuedAt => "handshake-invalid-issued-at",
            Self::InvalidExpiresAt => "handshake-invalid-expires-at",
            Self::ExpiryNotAfterIssue => "handshake-expiry-not-after-issue",
            Self::InvalidMetadata => "handshake-invalid-metadata",
        }
    }
}

impl fmt::Display for HandshakeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handshake rejection with its code and field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} at {path}: {message}")]
pub struct HandshakeError {
    /// Rejection code.
    pub code: HandshakeErrorCode,
    /// Dotted path of the offending field.
    pub path: String,
    /// Human-readable detail.
    pub message: String,
}

impl HandshakeError {
    /// Builds an error for a field under the handshake root.
    fn field(code: HandshakeErrorCode, field: &str, message: &str) -> Self {
        Self {
            code,
            path: format!("{ROOT_PATH}.{field}"),
            message: message.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Creation
// ============================================================================

/// Creates an envelope issued at `now_ms`.
///
/// Strings are trimmed, blank optionals become absent, a blank session id is
/// replaced with a random one, the TTL is clamped into `(0, 24h]`, and
/// metadata is sanitized (dropped entirely if nothing survives).
///
/// Every envelope returned passes [`validate`]. A blank adapter id has no
/// valid normalization, so it is refused instead of being issued.
///
/// # Errors
///
/// Returns [`HandshakeErrorCode::MissingAdapterId`] when the adapter id is
/// blank; no other input can make creation fail.
pub fn create(seed: HandshakeSeed, now_ms: u64) -> Result<HandshakeEnvelope, HandshakeError> {
    let adapter_id = seed.adapter_id.trim().to_string();
    if adapter_id.is_empty() {
        return Err(HandshakeError::field(
            HandshakeErrorCode::MissingAdapterId,
            "adapterId",
            "adapter id must be non-empty",
        ));
    }
    let session_id = normalize_optional(seed.session_id.as_deref())
        .unwrap_or_else(|| format!("hs-{}", random_hex(SESSION_ID_BYTES)));
    let ttl_ms = clamp_ttl(seed.ttl_ms);
    let issued_at = now_ms.min(u64::MAX - ttl_ms);
    let metadata = seed.metadata.and_then(|metadata| sanitize(&metadata, "metadata").value);
    Ok(HandshakeEnvelope {
        protocol: HANDSHAKE_PROTOCOL.to_string(),
        session_id,
        adapter_id,
        tool_id: normalize_optional(seed.tool_id.as_deref()),
        role: seed.role,
        issued_at,
        expires_at: issued_at + ttl_ms,
        metadata,
    })
}

/// Clamps a requested TTL into `(0, MAX_HANDSHAKE_TTL_MS]`.
#[must_use]
pub fn clamp_ttl(ttl_ms: Option<u64>) -> u64 {
    match ttl_ms {
        None | Some(0) => DEFAULT_HANDSHAKE_TTL_MS,
        Some(ttl) => ttl.min(MAX_HANDSHAKE_TTL_MS),
    }
}

/// Trusted issuer bound to a clock.
#[derive(Clone)]
pub struct HandshakeIssuer {
    /// Time source for issue timestamps.
    clock: SharedClock,
}

impl HandshakeIssuer {
    /// Creates an issuer using `clock`.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
        }
    }

    /// Issues an envelope at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] when the adapter id is blank.
    pub fn issue(&self, seed: HandshakeSeed) -> Result<HandshakeEnvelope, HandshakeError> {
        create(seed, self.clock.now_ms())
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates an untrusted envelope candidate.
///
/// # Errors
///
/// Returns the first [`HandshakeError`] found, checking fields in the order
/// protocol, session id, adapter id, tool id, role, timestamps, metadata.
pub fn validate(value: &Value) -> Result<HandshakeEnvelope, HandshakeError> {
    let Some(object) = value.as_object() else {
        return Err(HandshakeError {
            code: HandshakeErrorCode::NotObject,
            path: ROOT_PATH.to_string(),
            message: "handshake must be an object".to_string(),
        });
    };
    match object.get("protocol").and_then(Value::as_str) {
        Some(HANDSHAKE_PROTOCOL) => {}
        _ => {
            return Err(HandshakeError::field(
                HandshakeErrorCode::ProtocolMismatch,
                "protocol",
                "unsupported handshake protocol",
            ));
        }
    }
    let session_id = required_string(object, "sessionId").ok_or_else(|| {
        HandshakeError::field(
            HandshakeErrorCode::MissingSessionId,
            "sessionId",
            "session id must be a non-empty string",
        )
    })?;
    let adapter_id = required_string(object, "adapterId").ok_or_else(|| {
        HandshakeError::field(
            HandshakeErrorCode::MissingAdapterId,
            "adapterId",
            "adapter id must be a non-empty string",
        )
    })?;
    let tool_id = match object.get("toolId") {
        None | Some(Value::Null) => None,
        Some(Value::String(tool)) => normalize_optional(Some(tool)),
        Some(_) => {
            return Err(HandshakeError::field(
                HandshakeErrorCode::InvalidToolId,
                "toolId",
                "tool id must be a string",
            ));
        }
    };
    let role = object.get("role").and_then(Value::as_str).and_then(Role::parse).ok_or_else(|| {
        HandshakeError::field(HandshakeErrorCode::InvalidRole, "role", "role must be host or student")
    })?;
    let issued_at = object.get("issuedAt").and_then(Value::as_u64).ok_or_else(|| {
        HandshakeError::field(
            HandshakeErrorCode::InvalidIssuedAt,
            "issuedAt",
            "issuedAt must be a non-negative integer",
        )
    })?;
    let expires_at = object.get("expiresAt").and_then(Value::as_u64).ok_or_else(|| {
        HandshakeError::field(
            HandshakeErrorCode::InvalidExpiresAt,
            "expiresAt",
            "expiresAt must be a non-negative integer",
        )
    })?;
    if expires_at <= issued_at {
        return Err(HandshakeError::field(
            HandshakeErrorCode::ExpiryNotAfterIssue,
            "expiresAt",
            "expiresAt must be after issuedAt",
        ));
    }
    let metadata = match object.get("metadata") {
        None | Some(Value::Null) => None,
        Some(metadata) if is_json_safe(metadata) => Some(metadata.clone()),
        Some(_) => {
            return Err(HandshakeError::field(
                HandshakeErrorCode::InvalidMetadata,
                "metadata",
                "metadata exceeds depth or size bounds",
            ));
        }
    };
    Ok(HandshakeEnvelope {
        protocol: HANDSHAKE_PROTOCOL.to_string(),
        session_id,
        adapter_id,
        tool_id,
        role,
        issued_at,
        expires_at,
        metadata,
    })
}

/// Returns a trimmed, non-empty string field.
fn required_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    normalize_optional(object.get(key).and_then(Value::as_str))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
