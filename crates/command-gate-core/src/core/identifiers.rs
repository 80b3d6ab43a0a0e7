// crates/command-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Command Gate Identifiers
// Description: Caller roles and command mutation scopes.
// Purpose: Give the closed vocabularies used across dispatch and sessions a typed form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Roles and mutation scopes arrive as strings from untrusted callers. Both
//! parse from trimmed, ASCII case-insensitive text and serialize as
//! lowercase labels, which are part of the wire and audit contracts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Role
// ============================================================================

/// Caller role for dispatch and session authorization.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Privileged operator; may run any command and register plugins.
    #[default]
    Host,
    /// Restricted participant; approval-gated commands are queued.
    Student,
}

impl Role {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Student => "student",
        }
    }

    /// Parses a role label, returning `None` for anything outside the vocabulary.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("host") {
            Some(Self::Host)
        } else if trimmed.eq_ignore_ascii_case("student") {
            Some(Self::Student)
        } else {
            None
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownLabel(value.to_string()))
    }
}

// ============================================================================
// SECTION: Mutation Scope
// ============================================================================

/// Declared blast radius of a command. Used for audit classification only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationScope {
    /// Mutates the shared document.
    Doc,
    /// Mutates synchronized session state.
    Sync,
    /// Mutates caller-local state only.
    Local,
}

impl MutationScope {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Sync => "sync",
            Self::Local => "local",
        }
    }

    /// Parses a scope label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "doc" => Some(Self::Doc),
            "sync" => Some(Self::Sync),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for MutationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationScope {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownLabel(value.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Label outside a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Trims a string, mapping empty results to `None`.
#[must_use]
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty()).map(str::to_string)
}
