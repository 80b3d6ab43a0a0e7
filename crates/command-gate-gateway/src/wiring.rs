// crates/command-gate-gateway/src/wiring.rs
// ============================================================================
// Module: Application Wiring
// Description: Process-wide default command bus for application wiring.
// Purpose: Offer one shared bus to hosts that want it, with a reset for tests.
// Dependencies: command-gate-core
// ============================================================================

//! ## Overview
//! Library code never reaches for a global: the core and the gateway take
//! their [`CommandBus`] explicitly. Applications that prefer a single shared
//! bus call [`shared_command_bus`]; tests call [`reset_shared_command_bus`]
//! to start from an empty registry and cache.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use command_gate_core::CommandBus;

// ============================================================================
// SECTION: Shared Instance
// ============================================================================

/// Lazily created shared bus.
static SHARED_BUS: Mutex<Option<Arc<CommandBus>>> = Mutex::new(None);

/// Returns the shared bus, creating it with system defaults on first use.
#[must_use]
pub fn shared_command_bus() -> Arc<CommandBus> {
    let mut slot = SHARED_BUS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert_with(|| Arc::new(CommandBus::default())))
}

/// Drops the shared bus; the next [`shared_command_bus`] call builds a new one.
///
/// Holders of the previous bus keep using it.
pub fn reset_shared_command_bus() {
    SHARED_BUS.lock().unwrap_or_else(PoisonError::into_inner).take();
}

// ============================================================================
// SECTION: Tests
// ============================================================================
