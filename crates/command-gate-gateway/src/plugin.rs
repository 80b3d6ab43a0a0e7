// crates/command-gate-gateway/src/plugin.rs
// ============================================================================
// Module: Plugin Loader Interface
// Description: Host-supplied plugin registration hook for `plugin.register`.
// Purpose: Keep plugin loading outside the gateway while routing calls to it.
// Dependencies: async-trait, command-gate-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The gateway never loads plugins itself. A host installs a
//! [`PluginLoader`]; `plugin.register` calls from host sessions are handed
//! to it with the caller's role and origin. Loader failures carry their own
//! code, which the gateway surfaces verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use command_gate_core::Role;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Caller identity passed to the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    /// Session role (always host when the gateway calls the loader).
    pub role: Role,
    /// Session origin.
    pub origin: String,
}

/// Loader rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PluginLoadError {
    /// Stable failure label; empty falls back to `plugin-register-failed`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl PluginLoadError {
    /// Builds a loader error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Plugin registration hook.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Registers a plugin manifest.
    ///
    /// # Errors
    ///
    /// Returns [`PluginLoadError`] when the plugin is rejected.
    async fn register(&self, plugin: Value, ctx: PluginContext) -> Result<Value, PluginLoadError>;
}
