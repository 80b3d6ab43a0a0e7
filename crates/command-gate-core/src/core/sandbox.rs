// crates/command-gate-core/src/core/sandbox.rs
// ============================================================================
// Module: Sandbox Policy
// Description: Allow/deny decisions for adapter invocations.
// Purpose: Require a valid, matching handshake before any local adapter runs.
// Dependencies: crate::core::handshake, serde_json
// ============================================================================

//! ## Overview
//! [`SandboxPolicy::decide`] is a pure function of its inputs. Adapters whose
//! id starts with one of the configured local prefixes require a handshake
//! envelope; every other adapter is allowed outright. When a handshake is
//! required it must validate, be unexpired at the supplied `now`, and match
//! the requested adapter, tool (if the envelope names one), and role (if the
//! request names one).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::core::handshake::HandshakeError;
use crate::core::handshake::validate;
use crate::core::identifiers::Role;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Adapter id prefixes that require a handshake by default.
pub const DEFAULT_LOCAL_ADAPTER_PREFIXES: [&str; 3] = ["local.", "local:", "local/"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Reason attached to every sandbox decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxReason {
    /// Adapter id missing or blank.
    InvalidAdapterId,
    /// Tool id missing or blank.
    InvalidToolId,
    /// Adapter does not require a handshake.
    AllowedNonLocalAdapter,
    /// Local adapter requested without a handshake.
    MissingHandshake,
    /// Handshake candidate failed validation.
    InvalidHandshake,
    /// Handshake expired.
    ExpiredHandshake,
    /// Handshake authorizes a different adapter.
    AdapterMismatch,
    /// Handshake authorizes a different tool.
    ToolMismatch,
    /// Handshake was issued for a different role.
    RoleMismatch,
    /// Handshake matched the request.
    Allowed,
}

impl SandboxReason {
    /// Returns the stable label for this reason.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InvalidAdapterId => "invalid-adapter-id",
            Self::InvalidToolId => "invalid-tool-id",
            Self::AllowedNonLocalAdapter => "sandbox-allowed-non-local-adapter",
            Self::MissingHandshake => "missing-handshake",
            Self::InvalidHandshake => "invalid-handshake",
            Self::ExpiredHandshake => "expired-handshake",
            Self::AdapterMismatch => "adapter-mismatch",
            Self::ToolMismatch => "tool-mismatch",
            Self::RoleMismatch => "role-mismatch",
            Self::Allowed => "sandbox-allowed",
        }
    }
}

impl fmt::Display for SandboxReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inputs for one sandbox decision.
#[derive(Debug, Clone, Copy)]
pub struct SandboxRequest<'a> {
    /// Adapter being invoked.
    pub adapter_id: &'a str,
    /// Tool being invoked on the adapter.
    pub tool_id: &'a str,
    /// Role the caller claims, if any.
    pub role: Option<Role>,
    /// Untrusted handshake candidate, if supplied.
    pub handshake: Option<&'a Value>,
    /// Current time in unix milliseconds.
    pub now_ms: u64,
}

/// Outcome of a sandbox decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxDecision {
    /// Invocation may proceed.
    Allow {
        /// Why the invocation was allowed.
        reason: SandboxReason,
        /// Whether a handshake was required for this adapter.
        requires_handshake: bool,
        /// Handshake session id, for audit correlation.
        session_id: Option<String>,
    },
    /// Invocation must not proceed.
    Deny {
        /// Why the invocation was denied.
        reason: SandboxReason,
        /// Human-readable detail.
        message: String,
        /// Underlying validation failure for `invalid-handshake`.
        handshake_error: Option<HandshakeError>,
    },
}

impl SandboxDecision {
    /// Returns true for [`SandboxDecision::Allow`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Returns the decision reason.
    #[must_use]
    pub const fn reason(&self) -> SandboxReason {
        match self {
            Self::Allow {
                reason, ..
            }
            | Self::Deny {
                reason, ..
            } => *reason,
        }
    }

    /// Builds a deny decision without handshake detail.
    fn deny(reason: SandboxReason, message: impl Into<String>) -> Self {
        Self::Deny {
            reason,
            message: message.into(),
            handshake_error: None,
        }
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Handshake requirement policy for adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    /// Lowercased adapter prefixes that require a handshake.
    local_prefixes: Vec<String>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_ADAPTER_PREFIXES)
    }
}

impl SandboxPolicy {
    /// Builds a policy from a set of local adapter prefixes.
    ///
    /// Prefixes are trimmed and lowercased; blank entries are ignored.
    #[must_use]
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut local_prefixes: Vec<String> = prefixes
            .into_iter()
            .map(|prefix| prefix.as_ref().trim().to_ascii_lowercase())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        local_prefixes.sort();
        local_prefixes.dedup();
        Self {
            local_prefixes,
        }
    }

    /// Returns the configured prefixes.
    #[must_use]
    pub fn local_prefixes(&self) -> &[String] {
        &self.local_prefixes
    }

    /// Returns true when the adapter id requires a handshake.
    #[must_use]
    pub fn requires_handshake(&self, adapter_id: &str) -> bool {
        let adapter = adapter_id.trim().to_ascii_lowercase();
        self.local_prefixes.iter().any(|prefix| adapter.starts_with(prefix.as_str()))
    }

    /// Decides whether an adapter invocation is allowed.
    #[must_use]
    pub fn decide(&self, request: &SandboxRequest<'_>) -> SandboxDecision {
        let adapter_id = request.adapter_id.trim();
        if adapter_id.is_empty() {
            return SandboxDecision::deny(
                SandboxReason::InvalidAdapterId,
                "adapter id must be non-empty",
            );
        }
        let tool_id = request.tool_id.trim();
        if tool_id.is_empty() {
            return SandboxDecision::deny(SandboxReason::InvalidToolId, "tool id must be non-empty");
        }
        if !self.requires_handshake(adapter_id) {
            return SandboxDecision::Allow {
                reason: SandboxReason::AllowedNonLocalAdapter,
                requires_handshake: false,
                session_id: None,
            };
        }
        let Some(candidate) = request.handshake else {
            return SandboxDecision::deny(
                SandboxReason::MissingHandshake,
                format!("adapter '{adapter_id}' requires a handshake"),
            );
        };
        let envelope = match validate(candidate) {
            Ok(envelope) => envelope,
            Err(err) => {
                return SandboxDecision::Deny {
                    reason: SandboxReason::InvalidHandshake,
                    message: err.to_string(),
                    handshake_error: Some(err),
                };
            }
        };
        if envelope.is_expired(request.now_ms) {
            return SandboxDecision::deny(SandboxReason::ExpiredHandshake, "handshake expired");
        }
        if envelope.adapter_id != adapter_id {
            return SandboxDecision::deny(
                SandboxReason::AdapterMismatch,
                format!("handshake does not authorize adapter '{adapter_id}'"),
            );
        }
        if let Some(bound_tool) = &envelope.tool_id
            && bound_tool != tool_id
        {
            return SandboxDecision::deny(
                SandboxReason::ToolMismatch,
                format!("handshake does not authorize tool '{tool_id}'"),
            );
        }
        if let Some(role) = request.role
            && role != envelope.role
        {
            return SandboxDecision::deny(
                SandboxReason::RoleMismatch,
                format!("handshake was issued for role '{}'", envelope.role),
            );
        }
        SandboxDecision::Allow {
            reason: SandboxReason::Allowed,
            requires_handshake: true,
            session_id: Some(envelope.session_id),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
