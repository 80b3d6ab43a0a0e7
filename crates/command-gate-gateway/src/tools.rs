// crates/command-gate-gateway/src/tools.rs
// ============================================================================
// Module: Tool Call Routing
// Description: Parses `call_tool` parameters into a typed route.
// Purpose: Reject malformed tool calls before they reach the dispatch engine.
// Dependencies: command-gate-core, serde_json
// ============================================================================

//! ## Overview
//! A `call_tool` message names its route in `name`, `tool`, or `target`:
//!
//! - `command` dispatches a registered command. Arguments come from
//!   `arguments`, `args`, or `input` (falling back to the params object)
//!   and carry `commandId` (or `command`/`id`), an optional `payload`, an
//!   optional `meta` object, and an optional `idempotencyKey`.
//! - `command:<id>` is shorthand for the command route with the id inline.
//! - `plugin.register` hands a `plugin` (or `manifest`) object to the
//!   plugin loader.
//!
//! Payloads, metadata, and plugin values must fit the JSON-safety bounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use command_gate_core::is_json_safe;
use serde_json::Map;
use serde_json::Value;

use crate::protocol::GatewayError;
use crate::protocol::GatewayErrorCode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Route name for command dispatch.
pub const COMMAND_ROUTE: &str = "command";

/// Route name for plugin registration.
pub const PLUGIN_REGISTER_ROUTE: &str = "plugin.register";

/// Routes understood by `call_tool`.
pub const TOOL_ROUTES: [&str; 2] = [COMMAND_ROUTE, PLUGIN_REGISTER_ROUTE];

/// Prefix of the inline command shorthand.
const COMMAND_SHORTHAND_PREFIX: &str = "command:";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Parsed `call_tool` request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRoute {
    /// Dispatch a registered command.
    Command {
        /// Command id.
        command_id: String,
        /// Untrusted command payload.
        payload: Value,
        /// Caller metadata.
        meta: Map<String, Value>,
        /// Optional idempotency key.
        idempotency_key: Option<String>,
    },
    /// Register a plugin through the loader.
    PluginRegister {
        /// Plugin manifest value.
        plugin: Value,
    },
}

impl ToolRoute {
    /// Returns the route name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Command {
                ..
            } => COMMAND_ROUTE,
            Self::PluginRegister {
                ..
            } => PLUGIN_REGISTER_ROUTE,
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses `call_tool` params into a route.
///
/// # Errors
///
/// Returns `unsupported-tool-route`, `invalid-command-id`,
/// `invalid-command-payload`, `invalid-command-meta`, or
/// `invalid-plugin-payload`.
pub fn parse_tool_call(params: &Map<String, Value>) -> Result<ToolRoute, GatewayError> {
    let route = ["name", "tool", "target"]
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .unwrap_or_default();
    let args = ["arguments", "args", "input"]
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_object))
        .unwrap_or(params);

    if let Some(inline_id) = strip_shorthand(route) {
        return parse_command(args, Some(inline_id));
    }
    if route.eq_ignore_ascii_case(COMMAND_ROUTE) {
        return parse_command(args, None);
    }
    if route.eq_ignore_ascii_case(PLUGIN_REGISTER_ROUTE) {
        return parse_plugin(args);
    }
    let message = if route.is_empty() {
        "call_tool requires a route name".to_string()
    } else {
        format!("unsupported tool route '{route}'")
    };
    Err(GatewayError::new(GatewayErrorCode::UnsupportedToolRoute, message))
}

/// Returns the id of a `command:<id>` shorthand route.
fn strip_shorthand(route: &str) -> Option<&str> {
    let prefix = route.get(.. COMMAND_SHORTHAND_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(COMMAND_SHORTHAND_PREFIX) {
        return None;
    }
    route.get(COMMAND_SHORTHAND_PREFIX.len() ..).map(str::trim)
}

/// Parses the command route arguments.
fn parse_command(args: &Map<String, Value>, inline_id: Option<&str>) -> Result<ToolRoute, GatewayError> {
    let command_id = match inline_id {
        Some(id) => Some(Ok(id)),
        None => ["commandId", "command", "id"].iter().find_map(|key| args.get(*key)).map(|value| {
            value.as_str().ok_or_else(|| {
                GatewayError::new(GatewayErrorCode::InvalidCommandId, "command id must be a string")
            })
        }),
    }
    .transpose()?
    .map(str::trim)
    .filter(|id| !id.is_empty())
    .ok_or_else(|| GatewayError::new(GatewayErrorCode::InvalidCommandId, "command id must be a non-empty string"))?;

    let payload = match args.get("payload") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(payload) => payload.clone(),
    };
    if !is_json_safe(&payload) {
        return Err(GatewayError::new(
            GatewayErrorCode::InvalidCommandPayload,
            "command payload exceeds JSON safety limits",
        ));
    }

    let meta = match args.get("meta") {
        None | Some(Value::Null) => Map::new(),
        Some(value) => {
            let Some(meta) = value.as_object() else {
                return Err(GatewayError::new(GatewayErrorCode::InvalidCommandMeta, "command meta must be an object"));
            };
            if !is_json_safe(value) {
                return Err(GatewayError::new(
                    GatewayErrorCode::InvalidCommandMeta,
                    "command meta exceeds JSON safety limits",
                ));
            }
            meta.clone()
        }
    };

    let idempotency_key = match args.get("idempotencyKey") {
        None | Some(Value::Null) => None,
        Some(Value::String(key)) => Some(key.trim().to_string()).filter(|key| !key.is_empty()),
        Some(_) => {
            return Err(GatewayError::new(
                GatewayErrorCode::InvalidCommandPayload,
                "idempotencyKey must be a string",
            ));
        }
    };

    Ok(ToolRoute::Command {
        command_id: command_id.to_string(),
        payload,
        meta,
        idempotency_key,
    })
}

/// Parses the plugin registration arguments.
fn parse_plugin(args: &Map<String, Value>) -> Result<ToolRoute, GatewayError> {
    let plugin = ["plugin", "manifest"].iter().find_map(|key| args.get(*key));
    match plugin {
        Some(plugin) if plugin.is_object() && is_json_safe(plugin) => Ok(ToolRoute::PluginRegister {
            plugin: plugin.clone(),
        }),
        Some(plugin) if plugin.is_object() => Err(GatewayError::new(
            GatewayErrorCode::InvalidPluginPayload,
            "plugin value exceeds JSON safety limits",
        )),
        _ => Err(GatewayError::new(
            GatewayErrorCode::InvalidPluginPayload,
            "plugin.register requires a plugin object",
        )),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
