// crates/command-gate-gateway/src/session.rs
// ============================================================================
// Module: Gateway Sessions
// Description: Session records and the bounded in-memory session store.
// Purpose: Bind session tokens to the origin, source, and role that opened them.
// Dependencies: command-gate-core
// ============================================================================

//! ## Overview
//! A session is created by a successful `init` and lives until its expiry,
//! an explicit close, or a use from another origin or source. Expiry is
//! lazy: [`SessionStore::prune`] runs at the start of every message.
//!
//! Expired sessions leave a tombstone (a token fingerprint, not the token)
//! so a late use reports `session-expired` instead of `session-invalid`.
//! Tombstones are bounded and evicted oldest first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use command_gate_core::Role;

use crate::channel::SourceId;
use crate::protocol::GatewayError;
use crate::protocol::GatewayErrorCode;
use crate::security::token_fingerprint;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum remembered expired-session fingerprints.
pub const MAX_SESSION_TOMBSTONES: usize = 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authenticated gateway session.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewaySession {
    /// Bearer token minted at `init`.
    pub token: String,
    /// Role granted at `init`.
    pub role: Role,
    /// Origin that opened the session.
    pub origin: String,
    /// Message source that opened the session.
    pub source: SourceId,
    /// Creation time in unix milliseconds.
    pub created_at_ms: u64,
    /// Expiry in unix milliseconds.
    pub expires_at_ms: u64,
}

impl GatewaySession {
    /// Returns true once `now_ms` reaches the expiry.
    #[must_use]
    pub const fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Returns the audit fingerprint of the token.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("origin", &self.origin)
            .field("source", &self.source)
            .field("created_at_ms", &self.created_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Live sessions keyed by token.
///
/// # Invariants
/// - Never holds more than `max_sessions` live sessions.
/// - A session returned by [`SessionStore::authenticate`] is unexpired and
///   bound to the caller's origin and source.
#[derive(Debug)]
pub struct SessionStore {
    /// Live sessions.
    sessions: HashMap<String, GatewaySession>,
    /// Live session bound.
    max_sessions: usize,
    /// Fingerprints of expired sessions, oldest first.
    tombstone_order: VecDeque<String>,
    /// Fingerprint membership for `tombstone_order`.
    tombstones: HashSet<String>,
}

impl SessionStore {
    /// Creates an empty store bounded to `max_sessions` live sessions.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
            tombstone_order: VecDeque::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Removes expired sessions and returns them.
    pub fn prune(&mut self, now_ms: u64) -> Vec<GatewaySession> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.is_expired(now_ms))
            .map(|session| session.token.clone())
            .collect();
        let mut removed = Vec::with_capacity(expired.len());
        for token in expired {
            if let Some(session) = self.sessions.remove(&token) {
                self.bury(&token);
                removed.push(session);
            }
        }
        removed
    }

    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns `session-limit-reached` when the live bound is reached.
    pub fn insert(&mut self, session: GatewaySession) -> Result<(), GatewayError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(GatewayError::new(
                GatewayErrorCode::SessionLimitReached,
                format!("gateway session limit of {} reached", self.max_sessions),
            ));
        }
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    /// Resolves a token for a caller.
    ///
    /// A session used from another origin or source is closed before the
    /// mismatch is reported.
    ///
    /// # Errors
    ///
    /// Returns `session-invalid`, `session-expired`,
    /// `session-origin-mismatch`, or `session-source-mismatch`.
    pub fn authenticate(
        &mut self,
        token: &str,
        origin: &str,
        source: &SourceId,
        now_ms: u64,
    ) -> Result<GatewaySession, GatewayError> {
        let Some(session) = self.sessions.get(token) else {
            if self.tombstones.contains(&token_fingerprint(token)) {
                return Err(expired_error());
            }
            return Err(GatewayError::new(GatewayErrorCode::SessionInvalid, "session token is not recognized"));
        };
        if session.is_expired(now_ms) {
            self.sessions.remove(token);
            self.bury(token);
            return Err(expired_error());
        }
        if session.origin != origin {
            self.sessions.remove(token);
            return Err(GatewayError::new(
                GatewayErrorCode::SessionOriginMismatch,
                "session was opened from a different origin",
            ));
        }
        if &session.source != source {
            self.sessions.remove(token);
            return Err(GatewayError::new(
                GatewayErrorCode::SessionSourceMismatch,
                "session was opened from a different message source",
            ));
        }
        Ok(session.clone())
    }

    /// Closes a session; later uses report `session-invalid`.
    pub fn close(&mut self, token: &str) -> Option<GatewaySession> {
        self.sessions.remove(token)
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true when no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session and tombstone.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.tombstone_order.clear();
        self.tombstones.clear();
    }

    /// Records an expired token fingerprint.
    fn bury(&mut self, token: &str) {
        let fingerprint = token_fingerprint(token);
        if !self.tombstones.insert(fingerprint.clone()) {
            return;
        }
        self.tombstone_order.push_back(fingerprint);
        while self.tombstone_order.len() > MAX_SESSION_TOMBSTONES {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }
}

/// Builds the `session-expired` error.
fn expired_error() -> GatewayError {
    GatewayError::new(GatewayErrorCode::SessionExpired, "session has expired; call init again")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
