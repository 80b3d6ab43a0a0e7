// crates/command-gate-cli/src/lib.rs
// ============================================================================
// Module: Command Gate CLI Library
// Description: Shared helpers for the Command Gate command-line interface.
// Purpose: Provide the message catalog and serve wiring for the binary and tests.
// Dependencies: command-gate-config, command-gate-core, command-gate-gateway
// ============================================================================

//! ## Overview
//! This library houses the message catalog and the gateway wiring used by
//! `command-gate serve`. The binary entry point (`src/main.rs`) imports these
//! helpers to keep all user-facing output consistent.
//!
//! Security posture: CLI inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Message catalog.
pub mod i18n;
pub mod serve;
