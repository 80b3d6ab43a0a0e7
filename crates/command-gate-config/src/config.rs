// crates/command-gate-config/src/config.rs
// ============================================================================
// Module: Command Gate Configuration
// Description: Configuration loading and validation for the gateway stack.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: command-gate-core, command-gate-gateway, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then overlaid with `COMMAND_GATE_*` environment keys and validated. A
//! config that fails validation is never handed to the runtime: a missing
//! capability token or an empty origin allow-list denies startup rather than
//! starting an open gateway.
//!
//! Security posture: config inputs are untrusted; the capability token is
//! redacted from every rendering of the config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use command_gate_core::CommandBus;
use command_gate_core::CommandBusBuilder;
use command_gate_core::SandboxPolicy;
use command_gate_core::core::sandbox::DEFAULT_LOCAL_ADAPTER_PREFIXES;
use command_gate_core::runtime::DEFAULT_IDEMPOTENCY_TTL_MS;
use command_gate_core::runtime::DEFAULT_MAX_IDEMPOTENCY_ENTRIES;
use command_gate_core::runtime::MAX_IDEMPOTENCY_TTL_MS;
use command_gate_gateway::DEFAULT_GATEWAY_CHANNEL;
use command_gate_gateway::GatewayOptions;
use command_gate_gateway::runtime::DEFAULT_MAX_MESSAGE_BYTES;
use command_gate_gateway::runtime::DEFAULT_MAX_SESSIONS;
use command_gate_gateway::runtime::DEFAULT_SESSION_TTL_MS;
use command_gate_gateway::runtime::WILDCARD_ORIGIN;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "command-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "COMMAND_GATE_CONFIG";
/// Environment key overriding the origin allow-list (comma-separated).
pub const ALLOWED_ORIGINS_ENV: &str = "COMMAND_GATE_ALLOWED_ORIGINS";
/// Environment key overriding the capability token.
pub const CAPABILITY_TOKEN_ENV: &str = "COMMAND_GATE_CAPABILITY_TOKEN";
/// Environment key overriding the session TTL in milliseconds.
pub const SESSION_TTL_ENV: &str = "COMMAND_GATE_SESSION_TTL_MS";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of allowed origins.
pub(crate) const MAX_ALLOWED_ORIGINS: usize = 64;
/// Maximum length of a single origin string.
pub(crate) const MAX_ORIGIN_LENGTH: usize = 2048;
/// Maximum length of the capability token.
pub(crate) const MAX_CAPABILITY_TOKEN_LENGTH: usize = 256;
/// Maximum length of the channel tag and of UI slot names.
pub(crate) const MAX_LABEL_LENGTH: usize = 128;
/// Maximum session lifetime (24 hours).
pub(crate) const MAX_SESSION_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Upper bound for `gateway.max_sessions`.
pub(crate) const MAX_SESSIONS_LIMIT: usize = 65_536;
/// Upper bound for `dispatch.max_idempotency_entries`.
pub(crate) const MAX_IDEMPOTENCY_ENTRIES_LIMIT: usize = 1_048_576;
/// Upper bound for `gateway.max_message_bytes`.
pub(crate) const MAX_MESSAGE_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum number of UI slots.
pub(crate) const MAX_UI_SLOTS: usize = 64;
/// Maximum number of local adapter prefixes.
pub(crate) const MAX_LOCAL_PREFIXES: usize = 32;
/// Placeholder rendered in place of the capability token.
const REDACTED: &str = "<redacted>";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading the config file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parse failure.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config content failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Top-level Command Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandGateConfig {
    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Dispatch engine settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Sandbox policy settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Gateway settings (`[gateway]`).
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// Protocol tag on every message.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Exact origins allowed to talk to the gateway; `*` allows any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Shared secret required by `init`.
    #[serde(default)]
    pub capability_token: String,
    /// Session lifetime in milliseconds.
    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,
    /// Live session bound.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Inbound message bound in serialized bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// UI slot names advertised by `list_tools`.
    #[serde(default)]
    pub ui_slots: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            allowed_origins: Vec::new(),
            capability_token: String::new(),
            session_ttl_ms: default_session_ttl_ms(),
            max_sessions: default_max_sessions(),
            max_message_bytes: default_max_message_bytes(),
            ui_slots: Vec::new(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("channel", &self.channel)
            .field("allowed_origins", &self.allowed_origins)
            .field("capability_token", &redact(&self.capability_token))
            .field("session_ttl_ms", &self.session_ttl_ms)
            .field("max_sessions", &self.max_sessions)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("ui_slots", &self.ui_slots)
            .finish()
    }
}

impl GatewayConfig {
    /// Validates gateway settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_label("gateway.channel", &self.channel)?;
        if self.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid(
                "gateway.allowed_origins must list at least one origin".to_string(),
            ));
        }
        if self.allowed_origins.len() > MAX_ALLOWED_ORIGINS {
            return Err(ConfigError::Invalid("gateway.allowed_origins has too many entries".to_string()));
        }
        for origin in &self.allowed_origins {
            validate_origin(origin)?;
        }
        let token = self.capability_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid("gateway.capability_token must be non-empty".to_string()));
        }
        if token.len() > MAX_CAPABILITY_TOKEN_LENGTH {
            return Err(ConfigError::Invalid("gateway.capability_token exceeds max length".to_string()));
        }
        if self.session_ttl_ms == 0 || self.session_ttl_ms > MAX_SESSION_TTL_MS {
            return Err(ConfigError::Invalid(
                "gateway.session_ttl_ms must be between 1 and 86400000".to_string(),
            ));
        }
        if self.max_sessions == 0 || self.max_sessions > MAX_SESSIONS_LIMIT {
            return Err(ConfigError::Invalid("gateway.max_sessions out of range".to_string()));
        }
        if self.max_message_bytes == 0 || self.max_message_bytes > MAX_MESSAGE_BYTES_LIMIT {
            return Err(ConfigError::Invalid("gateway.max_message_bytes out of range".to_string()));
        }
        if self.ui_slots.len() > MAX_UI_SLOTS {
            return Err(ConfigError::Invalid("gateway.ui_slots has too many entries".to_string()));
        }
        for slot in &self.ui_slots {
            validate_label("gateway.ui_slots", slot)?;
        }
        Ok(())
    }
}

/// Dispatch engine settings (`[dispatch]`).
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Default idempotency TTL for keyed dispatches.
    #[serde(default = "default_idempotency_ttl_ms")]
    pub idempotency_ttl_ms: u64,
    /// Bound on idempotency keys tracked at once.
    #[serde(default = "default_max_idempotency_entries")]
    pub max_idempotency_entries: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_ms: default_idempotency_ttl_ms(),
            max_idempotency_entries: default_max_idempotency_entries(),
        }
    }
}

/// Sandbox policy settings (`[sandbox]`).
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Adapter id prefixes that require a handshake.
    #[serde(default = "default_local_adapter_prefixes")]
    pub local_adapter_prefixes: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            local_adapter_prefixes: default_local_adapter_prefixes(),
        }
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Audit disabled.
    None,
}

impl AuditSinkKind {
    /// Returns the config label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::None => "none",
        }
    }
}

/// Audit settings (`[audit]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path for the `file` sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => validate_path_string("audit.path", path),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl CommandGateConfig {
    /// Loads configuration from a TOML file, applies environment overrides,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Same as [`Self::load`] with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from defaults and the process environment only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is malformed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is malformed or the result
    /// fails validation.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `COMMAND_GATE_*` keys onto this config.
    ///
    /// Origins are split on commas, trimmed, and empties dropped. The token
    /// is trimmed. The TTL must parse as a positive integer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the TTL override is malformed.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origins) = lookup(ALLOWED_ORIGINS_ENV) {
            self.gateway.allowed_origins = parse_origin_list(&origins);
        }
        if let Some(token) = lookup(CAPABILITY_TOKEN_ENV) {
            self.gateway.capability_token = token.trim().to_string();
        }
        if let Some(ttl) = lookup(SESSION_TTL_ENV) {
            self.gateway.session_ttl_ms = match ttl.trim().parse::<u64>() {
                Ok(ttl) if ttl > 0 => ttl,
                _ => {
                    return Err(ConfigError::Invalid(format!("{SESSION_TTL_ENV} must be a positive integer")));
                }
            };
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        if self.dispatch.idempotency_ttl_ms == 0 || self.dispatch.idempotency_ttl_ms > MAX_IDEMPOTENCY_TTL_MS {
            return Err(ConfigError::Invalid(
                "dispatch.idempotency_ttl_ms must be between 1 and 86400000".to_string(),
            ));
        }
        let entries = self.dispatch.max_idempotency_entries;
        if entries == 0 || entries > MAX_IDEMPOTENCY_ENTRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "dispatch.max_idempotency_entries must be between 1 and {MAX_IDEMPOTENCY_ENTRIES_LIMIT}"
            )));
        }
        let prefixes = &self.sandbox.local_adapter_prefixes;
        if prefixes.is_empty() {
            return Err(ConfigError::Invalid(
                "sandbox.local_adapter_prefixes must list at least one prefix".to_string(),
            ));
        }
        if prefixes.len() > MAX_LOCAL_PREFIXES {
            return Err(ConfigError::Invalid("sandbox.local_adapter_prefixes has too many entries".to_string()));
        }
        for prefix in prefixes {
            validate_label("sandbox.local_adapter_prefixes", prefix)?;
        }
        self.audit.validate()
    }

    // ------------------------------------------------------------------------
    // Runtime conversion
    // ------------------------------------------------------------------------

    /// Converts the gateway section into runtime options.
    #[must_use]
    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            channel: self.gateway.channel.trim().to_string(),
            allowed_origins: self.gateway.allowed_origins.iter().map(|origin| origin.trim().to_string()).collect(),
            capability_token: self.gateway.capability_token.trim().to_string(),
            session_ttl_ms: self.gateway.session_ttl_ms,
            max_sessions: self.gateway.max_sessions,
            max_message_bytes: self.gateway.max_message_bytes,
            ui_slots: self.gateway.ui_slots.clone(),
        }
    }

    /// Builds the sandbox policy from the configured prefixes.
    #[must_use]
    pub fn sandbox_policy(&self) -> SandboxPolicy {
        SandboxPolicy::new(&self.sandbox.local_adapter_prefixes)
    }

    /// Returns a bus builder preloaded with the dispatch settings.
    #[must_use]
    pub fn command_bus_builder(&self) -> CommandBusBuilder {
        CommandBus::builder()
            .idempotency_ttl_ms(self.dispatch.idempotency_ttl_ms)
            .max_idempotency_entries(self.dispatch.max_idempotency_entries)
    }

    /// Renders the effective configuration with the token redacted.
    #[must_use]
    pub fn redacted_summary(&self) -> Value {
        json!({
            "gateway": {
                "channel": self.gateway.channel,
                "allowed_origins": self.gateway.allowed_origins,
                "capability_token": redact(&self.gateway.capability_token),
                "session_ttl_ms": self.gateway.session_ttl_ms,
                "max_sessions": self.gateway.max_sessions,
                "max_message_bytes": self.gateway.max_message_bytes,
                "ui_slots": self.gateway.ui_slots,
            },
            "dispatch": {
                "idempotency_ttl_ms": self.dispatch.idempotency_ttl_ms,
                "max_idempotency_entries": self.dispatch.max_idempotency_entries,
            },
            "sandbox": {
                "local_adapter_prefixes": self.sandbox.local_adapter_prefixes,
            },
            "audit": {
                "sink": self.audit.sink.as_str(),
                "path": self.audit.path,
            },
        })
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default channel tag.
pub(crate) fn default_channel() -> String {
    DEFAULT_GATEWAY_CHANNEL.to_string()
}

/// Default session TTL.
pub(crate) const fn default_session_ttl_ms() -> u64 {
    DEFAULT_SESSION_TTL_MS
}

/// Default live session bound.
pub(crate) const fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

/// Default inbound message bound.
pub(crate) const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Default idempotency TTL.
pub(crate) const fn default_idempotency_ttl_ms() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL_MS
}

/// Default idempotency key bound.
pub(crate) const fn default_max_idempotency_entries() -> usize {
    DEFAULT_MAX_IDEMPOTENCY_ENTRIES
}

/// Default local adapter prefixes.
pub(crate) fn default_local_adapter_prefixes() -> Vec<String> {
    DEFAULT_LOCAL_ADAPTER_PREFIXES.iter().map(|prefix| (*prefix).to_string()).collect()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Renders a secret for display.
fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { REDACTED }
}

/// Splits a comma-separated origin list.
pub(crate) fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|origin| !origin.is_empty()).map(ToString::to_string).collect()
}

/// Validates one allow-list entry: `*` or `scheme://host[:port]`.
pub(crate) fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    if origin == WILDCARD_ORIGIN {
        return Ok(());
    }
    if origin.is_empty() || origin.len() > MAX_ORIGIN_LENGTH {
        return Err(ConfigError::Invalid("gateway.allowed_origins entry has invalid length".to_string()));
    }
    if origin.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("origin '{origin}' must not contain whitespace")));
    }
    let Some((scheme, authority)) = origin.split_once("://") else {
        return Err(ConfigError::Invalid(format!("origin '{origin}' must be scheme://host")));
    };
    let scheme_ok = scheme.chars().next().is_some_and(|first| first.is_ascii_alphabetic())
        && scheme.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
    if !scheme_ok {
        return Err(ConfigError::Invalid(format!("origin '{origin}' has an invalid scheme")));
    }
    if authority.is_empty() || authority.contains(['/', '?', '#']) {
        return Err(ConfigError::Invalid(format!("origin '{origin}' must not carry a path, query, or fragment")));
    }
    Ok(())
}

/// Validates a short, non-empty label.
fn validate_label(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} entries must be non-empty")));
    }
    if trimmed.len() > MAX_LABEL_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} entry exceeds max length")));
    }
    Ok(())
}

/// Resolves the config path from an explicit path, the env var, or the default.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
