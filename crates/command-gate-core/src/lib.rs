// crates/command-gate-core/src/lib.rs
// ============================================================================
// Module: Command Gate Core Library
// Description: Public API surface for the Command Gate core.
// Purpose: Expose value safety, handshakes, sandbox policy, and the dispatch engine.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Command Gate core is the trust and dispatch layer for privileged
//! operations. It sanitizes untrusted JSON, issues and validates handshake
//! envelopes, decides sandbox access for local adapters, and runs registered
//! commands through an idempotent, approval-gated, audited pipeline. It is
//! transport-agnostic; the gateway crate terminates the wire protocol.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::AuditEventType;
pub use audit::CommandAuditEvent;
pub use audit::CommandAuditSink;
pub use audit::MemoryCommandAuditSink;
pub use audit::NoopCommandAuditSink;
pub use interfaces::ApprovalQueue;
pub use interfaces::ApprovalQueueError;
pub use interfaces::CommandError;
pub use interfaces::CommandExecutor;
pub use interfaces::ExecutionContext;
pub use interfaces::FixedRole;
pub use interfaces::ObjectPayload;
pub use interfaces::PayloadError;
pub use interfaces::PayloadValidator;
pub use interfaces::PendingApprovalEntry;
pub use interfaces::RoleProvider;
pub use interfaces::executor_fn;
pub use interfaces::validator_fn;
pub use runtime::CommandBus;
pub use runtime::CommandBusBuilder;
pub use runtime::CommandDescriptor;
pub use runtime::CommandRegistry;
pub use runtime::DispatchErrorCode;
pub use runtime::DispatchFailure;
pub use runtime::DispatchOptions;
pub use runtime::DispatchOutcome;
pub use runtime::DispatchResult;
pub use runtime::Registration;
pub use runtime::RegistryError;
pub use runtime::SandboxPreflight;
