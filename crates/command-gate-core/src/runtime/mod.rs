// crates/command-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Command Gate Runtime
// Description: Command registry, idempotency cache, and dispatch engine.
// Purpose: Execute registered commands behind validation and approval gates.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! [`CommandBus`] owns a [`CommandRegistry`] and an idempotency cache and is
//! the only path through which commands execute. Instances are explicit;
//! wiring layers decide whether to share one.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod idempotency;
pub mod outcome;
pub mod preflight;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::CommandBus;
pub use engine::CommandBusBuilder;
pub use engine::DispatchOptions;
pub use idempotency::DEFAULT_IDEMPOTENCY_TTL_MS;
pub use idempotency::DEFAULT_MAX_IDEMPOTENCY_ENTRIES;
pub use idempotency::MAX_IDEMPOTENCY_TTL_MS;
pub use outcome::DispatchErrorCode;
pub use outcome::DispatchFailure;
pub use outcome::DispatchOutcome;
pub use outcome::DispatchResult;
pub use preflight::SandboxPreflight;
pub use registry::CommandDescriptor;
pub use registry::CommandRegistry;
pub use registry::Registration;
pub use registry::RegistryError;
