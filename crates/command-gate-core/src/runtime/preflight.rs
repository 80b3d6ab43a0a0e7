// crates/command-gate-core/src/runtime/preflight.rs
// ============================================================================
// Module: Sandbox Preflight
// Description: Sandbox policy check bound to an execution context.
// Purpose: Let executors gate adapter invocations on the caller's handshake.
// Dependencies: crate::core::sandbox
// ============================================================================

//! ## Overview
//! The dispatch engine does not know which commands touch gated adapters.
//! Executors that do call [`SandboxPreflight::check`] before invoking the
//! adapter. The caller role comes from the [`ExecutionContext`] and the
//! handshake candidate from `meta.handshake`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::SandboxDecision;
use crate::core::SandboxPolicy;
use crate::core::SandboxRequest;
use crate::core::SharedClock;
use crate::interfaces::ExecutionContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Metadata key carrying the handshake candidate.
pub const HANDSHAKE_META_KEY: &str = "handshake";

// ============================================================================
// SECTION: Preflight
// ============================================================================

/// Sandbox policy plus the clock it is evaluated against.
#[derive(Clone)]
pub struct SandboxPreflight {
    /// Policy to evaluate.
    policy: SandboxPolicy,
    /// Time source for expiry checks.
    clock: SharedClock,
}

impl SandboxPreflight {
    /// Creates a preflight check.
    #[must_use]
    pub const fn new(policy: SandboxPolicy, clock: SharedClock) -> Self {
        Self {
            policy,
            clock,
        }
    }

    /// Returns the wrapped policy.
    #[must_use]
    pub const fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Decides whether the executing command may invoke `adapter_id`/`tool_id`.
    #[must_use]
    pub fn check(&self, ctx: &ExecutionContext, adapter_id: &str, tool_id: &str) -> SandboxDecision {
        self.policy.decide(&SandboxRequest {
            adapter_id,
            tool_id,
            role: Some(ctx.role),
            handshake: ctx.meta.get(HANDSHAKE_META_KEY),
            now_ms: self.clock.now_ms(),
        })
    }
}
