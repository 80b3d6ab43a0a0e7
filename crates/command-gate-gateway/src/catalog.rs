// crates/command-gate-gateway/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Command catalog and UI slot listing returned by `list_tools`.
// Purpose: Describe what a session may call without leaking unsafe values.
// Dependencies: command-gate-core, serde_json
// ============================================================================

//! ## Overview
//! A [`ToolCatalog`] supplies raw command records and UI slot names. The
//! gateway normalizes both before replying: records are sanitized, keyed
//! and deduplicated by `commandId` (first wins), and a record that fails
//! sanitization is reduced to its `commandId`. Slot names are trimmed with
//! empties and duplicates dropped.
//!
//! [`RegistryCatalog`] lists the commands registered with a
//! [`CommandRegistry`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use command_gate_core::CommandRegistry;
use command_gate_core::Role;
use command_gate_core::sanitize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Source of `list_tools` content.
pub trait ToolCatalog: Send + Sync {
    /// Returns raw command records for a session role.
    fn commands(&self, role: Role) -> Vec<Value>;

    /// Returns raw UI slot names.
    fn ui_slots(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Catalog backed by a command registry plus fixed UI slots.
#[derive(Debug, Clone)]
pub struct RegistryCatalog {
    /// Registry listed by the catalog.
    registry: Arc<CommandRegistry>,
    /// Configured slot names.
    ui_slots: Vec<String>,
}

impl RegistryCatalog {
    /// Creates a catalog over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<CommandRegistry>, ui_slots: Vec<String>) -> Self {
        Self {
            registry,
            ui_slots,
        }
    }
}

impl ToolCatalog for RegistryCatalog {
    fn commands(&self, _role: Role) -> Vec<Value> {
        self.registry.catalog()
    }

    fn ui_slots(&self) -> Vec<String> {
        self.ui_slots.clone()
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Sanitizes and deduplicates command records by `commandId`.
///
/// Records without a non-empty string `commandId` are dropped.
#[must_use]
pub fn normalize_catalog(records: &[Value]) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let Some(command_id) = record
            .get("commandId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        if !seen.insert(command_id.to_string()) {
            continue;
        }
        let sanitized = sanitize(record, &format!("commands[{index}]"));
        let entry = match sanitized.value {
            Some(Value::Object(mut fields)) => {
                fields.insert("commandId".to_string(), Value::String(command_id.to_string()));
                fields
            }
            _ => {
                let mut fields = Map::new();
                fields.insert("commandId".to_string(), Value::String(command_id.to_string()));
                fields
            }
        };
        normalized.push(Value::Object(entry));
    }
    normalized
}

/// Trims slot names and drops empties and duplicates, preserving order.
#[must_use]
pub fn normalize_slots(slots: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    slots
        .iter()
        .map(|slot| slot.trim())
        .filter(|slot| !slot.is_empty() && seen.insert(slot.to_string()))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
