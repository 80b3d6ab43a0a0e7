// crates/command-gate-core/src/runtime/idempotency.rs
// ============================================================================
// Module: Idempotency Cache
// Description: Keyed replay cache for dispatch results.
// Purpose: Give keyed dispatches at-most-once execution within a TTL window.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Entries are keyed by `(command id, role, idempotency key)`. A keyed
//! dispatch first claims a slot: a live completed entry is replayed, an
//! in-flight entry is shared so concurrent duplicates await the same
//! [`OnceCell`], and an absent entry becomes a fresh in-flight cell.
//! Expiry is lazy: [`IdempotencyCache::prune`] runs at the start of every
//! dispatch and no background timer exists.
//!
//! The number of tracked keys is bounded. A new key arriving at the bound
//! evicts the completed entry closest to expiry; when every slot is in
//! flight the new dispatch runs untracked and is not replayable.
//!
//! Security posture: keys are caller-supplied and untrusted; the cache only
//! ever replays results to the same command and role that produced them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::OnceCell;

use crate::core::Role;
use crate::runtime::outcome::DispatchResult;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default replay window in milliseconds.
pub const DEFAULT_IDEMPOTENCY_TTL_MS: u64 = 60_000;

/// Maximum replay window in milliseconds (24 hours).
pub const MAX_IDEMPOTENCY_TTL_MS: u64 = 86_400_000;

/// Default bound on tracked idempotency keys.
pub const DEFAULT_MAX_IDEMPOTENCY_ENTRIES: usize = 4096;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cache key for one keyed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Command id.
    pub command_id: String,
    /// Effective role.
    pub role: Role,
    /// Caller-supplied idempotency key.
    pub key: String,
}

/// Shared cell that resolves to the dispatch result once.
pub type InFlightCell = Arc<OnceCell<DispatchResult>>;

/// Stored state for one key.
#[derive(Debug)]
enum Slot {
    /// Dispatch running; duplicates await this cell.
    InFlight(InFlightCell),
    /// Dispatch finished; replay until `expires_at`.
    Complete {
        /// Stored result (never marked deduped).
        result: DispatchResult,
        /// Absolute expiry in unix milliseconds.
        expires_at: u64,
    },
}

/// Result of claiming a key.
#[derive(Debug)]
pub enum Claim {
    /// A live completed entry exists.
    Replay(DispatchResult),
    /// Await (or initialize) this cell.
    Cell(InFlightCell),
}

/// In-memory idempotency cache.
///
/// # Invariants
/// - A completed entry is never replayed at or after its expiry.
/// - The internal lock is never held across an `.await`.
/// - At most `max_entries` keys are tracked.
#[derive(Debug)]
pub struct IdempotencyCache {
    /// Slots keyed by dispatch identity.
    slots: Mutex<HashMap<CacheKey, Slot>>,
    /// Tracked key bound.
    max_entries: usize,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_IDEMPOTENCY_ENTRIES)
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

impl IdempotencyCache {
    /// Creates an empty cache with the default bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache tracking at most `max_entries` keys (minimum 1).
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the tracked key bound.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Evicts expired entries and abandoned in-flight cells.
    pub fn prune(&self, now_ms: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| match slot {
            Slot::Complete {
                expires_at, ..
            } => *expires_at > now_ms,
            Slot::InFlight(cell) => cell.initialized() || Arc::strong_count(cell) > 1,
        });
    }

    /// Claims a key: replays a live entry or returns the in-flight cell.
    pub fn claim(&self, key: &CacheKey, now_ms: u64) -> Claim {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(Slot::Complete {
                result,
                expires_at,
            }) if *expires_at > now_ms => return Claim::Replay(result.replayed()),
            Some(Slot::InFlight(cell)) => return Claim::Cell(Arc::clone(cell)),
            _ => {}
        }
        let cell: InFlightCell = Arc::new(OnceCell::new());
        if slots.contains_key(key) || make_room(&mut slots, self.max_entries) {
            slots.insert(key.clone(), Slot::InFlight(Arc::clone(&cell)));
        }
        Claim::Cell(cell)
    }

    /// Stores a finished result until `expires_at`.
    pub fn complete(&self, key: CacheKey, result: DispatchResult, expires_at: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.contains_key(&key) && !make_room(&mut slots, self.max_entries) {
            return;
        }
        slots.insert(
            key,
            Slot::Complete {
                result,
                expires_at,
            },
        );
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Ensures one free slot, evicting the completed entry closest to expiry.
///
/// Returns false when the cache is full of in-flight entries.
fn make_room(slots: &mut HashMap<CacheKey, Slot>, max_entries: usize) -> bool {
    if slots.len() < max_entries {
        return true;
    }
    let oldest = slots
        .iter()
        .filter_map(|(key, slot)| match slot {
            Slot::Complete {
                expires_at, ..
            } => Some((*expires_at, key)),
            Slot::InFlight(_) => None,
        })
        .min_by_key(|(expires_at, _)| *expires_at)
        .map(|(_, key)| key.clone());
    match oldest {
        Some(key) => {
            slots.remove(&key);
            true
        }
        None => false,
    }
}

/// Resolves a caller TTL: absent or zero uses the default, then clamps to 24h.
#[must_use]
pub fn resolve_ttl(requested: Option<u64>, default_ttl_ms: u64) -> u64 {
    let ttl = match requested {
        Some(ttl) if ttl > 0 => ttl,
        _ => default_ttl_ms,
    };
    ttl.clamp(1, MAX_IDEMPOTENCY_TTL_MS)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
