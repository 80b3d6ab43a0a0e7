// crates/command-gate-core/src/core/mod.rs
// ============================================================================
// Module: Command Gate Core Types
// Description: Value safety, identifiers, time, handshakes, and sandbox policy.
// Purpose: Group the pure building blocks shared by the dispatch runtime and gateway.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Everything in this module is free of hidden state: decisions depend only
//! on their arguments and an explicitly supplied time.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod handshake;
pub mod identifiers;
pub mod ids;
pub mod json_safety;
pub mod sandbox;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use handshake::HANDSHAKE_PROTOCOL;
pub use handshake::HandshakeEnvelope;
pub use handshake::HandshakeError;
pub use handshake::HandshakeErrorCode;
pub use handshake::HandshakeIssuer;
pub use handshake::HandshakeSeed;
pub use identifiers::MutationScope;
pub use identifiers::Role;
pub use ids::CorrelationIdGenerator;
pub use json_safety::JsonSafetyLimits;
pub use json_safety::Sanitized;
pub use json_safety::is_json_safe;
pub use json_safety::sanitize;
pub use json_safety::sanitize_with_limits;
pub use sandbox::SandboxDecision;
pub use sandbox::SandboxPolicy;
pub use sandbox::SandboxReason;
pub use sandbox::SandboxRequest;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SharedClock;
pub use time::SystemClock;
