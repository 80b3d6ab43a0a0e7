// crates/command-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical `command-gate.toml` example. The output is static and always
//! passes [`crate::CommandGateConfig::validate`] once parsed.

/// Returns a canonical example `command-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[gateway]
channel = "command-gate.gateway.v1"
allowed_origins = ["https://app.example"]
capability_token = "replace-with-a-long-random-secret"
session_ttl_ms = 300000
max_sessions = 256
max_message_bytes = 1048576
ui_slots = ["toolbar", "sidebar"]

[dispatch]
idempotency_ttl_ms = 60000
max_idempotency_entries = 4096

[sandbox]
local_adapter_prefixes = ["local.", "local:", "local/"]

[audit]
sink = "stderr"
# sink = "file"
# path = "command-gate-audit.jsonl"
"#,
    )
}
