// crates/command-gate-config/src/lib.rs
// ============================================================================
// Module: Command Gate Config Library
// Description: Configuration model, loading, and validation.
// Purpose: Turn a TOML file and environment keys into runtime settings.
// Dependencies: command-gate-core, command-gate-gateway, serde, toml
// ============================================================================

//! ## Overview
//! `command-gate-config` owns the `command-gate.toml` model. It loads and
//! validates configuration fail-closed and converts it into
//! [`command_gate_gateway::GatewayOptions`], a
//! [`command_gate_core::SandboxPolicy`], and a
//! [`command_gate_core::CommandBusBuilder`].

pub mod config;
pub mod examples;

pub use config::*;
pub use examples::config_toml_example;
