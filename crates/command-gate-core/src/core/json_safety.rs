// crates/command-gate-core/src/core/json_safety.rs
// ============================================================================
// Module: JSON Safety
// Description: Bounded, secret-scrubbing normalization of untrusted JSON values.
// Purpose: Keep every value that crosses a trust boundary small and credential-free.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Every payload that enters from an untrusted caller, or leaves toward one,
//! passes through [`sanitize`]. The walk copies the value while enforcing a
//! depth bound and a total node bound; anything past either bound is omitted
//! and its path recorded. The walk stops at the first node past the node
//! bound, so the recorded paths stay bounded too. Object keys that name credentials are dropped and
//! recorded as well, so secrets are never echoed back or written to audit
//! metadata.
//!
//! [`is_json_safe`] applies the same structural bounds without producing a
//! copy and is used to validate inbound payloads.
//!
//! `serde_json::Value` is an owned tree: it cannot contain cycles, functions,
//! or non-finite numbers, so those rejections are guaranteed by the type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum nesting depth (root is depth zero).
pub const DEFAULT_MAX_DEPTH: usize = 8;
/// Default maximum number of value nodes in one walk.
pub const DEFAULT_MAX_NODES: usize = 1024;

/// Normalized key names that are treated as credentials.
const SECRET_KEYS: &[&str] = &[
    "apikey",
    "secret",
    "secretkey",
    "clientsecret",
    "token",
    "accesstoken",
    "refreshtoken",
    "idtoken",
    "sessiontoken",
    "capabilitytoken",
    "authtoken",
    "bearertoken",
    "password",
    "passwd",
    "passphrase",
    "credential",
    "credentials",
    "privatekey",
    "authorization",
];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Structural bounds applied while walking a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSafetyLimits {
    /// Maximum nesting depth; the root value sits at depth zero.
    pub max_depth: usize,
    /// Maximum number of nodes (scalars and containers) visited.
    pub max_nodes: usize,
}

impl Default for JsonSafetyLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Result of sanitizing a value.
///
/// # Invariants
/// - `value` is `None` only when the root itself was omitted.
/// - `scrubbed_paths` lists omitted keys and elements in walk order. Past the
///   node bound only the first omitted node is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Sanitized copy of the input, if anything survived.
    pub value: Option<Value>,
    /// Paths of omitted values.
    pub scrubbed_paths: Vec<String>,
}

impl Sanitized {
    /// Returns true when the value survived untouched.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.value.is_some() && self.scrubbed_paths.is_empty()
    }

    /// Returns the sanitized value, substituting `null` when the root was dropped.
    #[must_use]
    pub fn into_value_or_null(self) -> Value {
        self.value.unwrap_or(Value::Null)
    }
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Sanitizes a value using the default limits.
///
/// `base_path` prefixes every recorded path (for example `"payload"` yields
/// `payload.user.apiKey` or `payload.items[3]`).
#[must_use]
pub fn sanitize(value: &Value, base_path: &str) -> Sanitized {
    sanitize_with_limits(value, base_path, JsonSafetyLimits::default())
}

/// Sanitizes a value with explicit limits.
#[must_use]
pub fn sanitize_with_limits(value: &Value, base_path: &str, limits: JsonSafetyLimits) -> Sanitized {
    let mut walker = SanitizeWalker {
        limits,
        nodes: 0,
        scrubbed: Vec::new(),
        exhausted: false,
    };
    let value = walker.visit(value, base_path, 0);
    Sanitized {
        value,
        scrubbed_paths: walker.scrubbed,
    }
}

/// Returns true when the value fits within the default limits.
#[must_use]
pub fn is_json_safe(value: &Value) -> bool {
    is_json_safe_with_limits(value, JsonSafetyLimits::default())
}

/// Returns true when the value fits within the given limits.
#[must_use]
pub fn is_json_safe_with_limits(value: &Value, limits: JsonSafetyLimits) -> bool {
    let mut nodes = 0usize;
    check_bounds(value, 0, limits, &mut nodes)
}

/// Returns true when a map key names a credential.
///
/// Matching ignores ASCII case and the separators `-`, `_`, `.` and spaces,
/// so `apiKey`, `API_KEY` and `api-key` all match.
#[must_use]
pub fn is_secret_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|ch| !matches!(ch, '-' | '_' | '.' | ' '))
        .map(|ch| ch.to_ascii_lowercase())
        .collect();
    SECRET_KEYS.contains(&normalized.as_str())
}

/// Joins an object key onto a path.
#[must_use]
pub fn child_key_path(base: &str, key: &str) -> String {
    if base.is_empty() { key.to_string() } else { format!("{base}.{key}") }
}

/// Joins an array index onto a path.
#[must_use]
pub fn child_index_path(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

// ============================================================================
// SECTION: Walkers
// ============================================================================

/// Copying walker that records omitted paths.
struct SanitizeWalker {
    /// Bounds for this walk.
    limits: JsonSafetyLimits,
    /// Nodes visited so far.
    nodes: usize,
    /// Omitted paths.
    scrubbed: Vec<String>,
    /// Set once the node bound is hit; the rest of the walk is skipped.
    exhausted: bool,
}

impl SanitizeWalker {
    /// Visits one node, returning its sanitized copy or `None` when omitted.
    fn visit(&mut self, value: &Value, path: &str, depth: usize) -> Option<Value> {
        if depth > self.limits.max_depth {
            self.scrubbed.push(path.to_string());
            return None;
        }
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            self.scrubbed.push(path.to_string());
            self.exhausted = true;
            return None;
        }
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let child_path = child_index_path(path, index);
                    if let Some(child) = self.visit(item, &child_path, depth + 1) {
                        out.push(child);
                    }
                    if self.exhausted {
                        break;
                    }
                }
                Some(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    let child_path = child_key_path(path, key);
                    if is_secret_key(key) {
                        self.scrubbed.push(child_path);
                        continue;
                    }
                    if let Some(child) = self.visit(item, &child_path, depth + 1) {
                        out.insert(key.clone(), child);
                    }
                    if self.exhausted {
                        break;
                    }
                }
                Some(Value::Object(out))
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Some(value.clone())
            }
        }
    }
}

/// Non-copying bounds check.
fn check_bounds(value: &Value, depth: usize, limits: JsonSafetyLimits, nodes: &mut usize) -> bool {
    if depth > limits.max_depth {
        return false;
    }
    *nodes += 1;
    if *nodes > limits.max_nodes {
        return false;
    }
    match value {
        Value::Array(items) => items.iter().all(|item| check_bounds(item, depth + 1, limits, nodes)),
        Value::Object(map) => map.values().all(|item| check_bounds(item, depth + 1, limits, nodes)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
