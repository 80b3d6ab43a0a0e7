// crates/command-gate-gateway/src/security.rs
// ============================================================================
// Module: Gateway Security Helpers
// Description: Constant-time comparison, token minting, and fingerprints.
// Purpose: Keep secret handling in one reviewed place.
// Dependencies: base64, rand, sha2, subtle
// ============================================================================

//! ## Overview
//! Capability tokens are compared in constant time. Session tokens are 32
//! bytes from the OS RNG, URL-safe base64 encoded. Audit records carry a
//! SHA-256 fingerprint of a token, never the token itself.
//!
//! Security posture: minimize timing side-channels when comparing secret
//! inputs and keep raw secrets out of logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random bytes per session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

// ============================================================================
// SECTION: Constant-Time Comparisons
// ============================================================================

/// Compares two byte slices in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Compares two strings in constant time.
#[must_use]
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Mints an unguessable session token.
#[must_use]
pub fn mint_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns the lowercase hex SHA-256 fingerprint of a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
