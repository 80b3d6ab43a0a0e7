// crates/command-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for command-gate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use command_gate_config::CommandGateConfig;
use command_gate_config::ConfigError;

/// Minimal TOML that passes validation.
pub const VALID_TOML: &str = r#"
[gateway]
allowed_origins = ["https://app.example"]
capability_token = "cap-7f3a"
"#;

/// Parses a TOML string into a `CommandGateConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<CommandGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a config with defaults plus the minimal required gateway settings.
pub fn valid_config() -> Result<CommandGateConfig, toml::de::Error> {
    config_from_toml(VALID_TOML)
}

/// Builds an environment lookup over fixed pairs.
pub fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key| pairs.iter().find(|(name, _)| *name == key).map(|(_, value)| (*value).to_string())
}

/// Environment lookup that never finds a key.
pub fn no_env(_key: &str) -> Option<String> {
    None
}

/// Asserts that `result` failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
