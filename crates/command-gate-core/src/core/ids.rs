// crates/command-gate-core/src/core/ids.rs
// ============================================================================
// Module: Identifier Generation
// Description: Random tokens and process-unique correlation identifiers.
// Purpose: Mint session ids, session tokens, and dispatch correlation ids.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Secrets (session tokens, handshake session ids) come straight from the
//! operating system RNG. Correlation identifiers only need uniqueness within
//! the process, so they combine a boot-scoped random value with a monotonic
//! counter.

use std::fmt::Write;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

/// Returns `byte_len` bytes from the OS RNG, hex encoded.
#[must_use]
pub fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(byte_len * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Boot-scoped correlation id generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Prefix included in every generated id.
    prefix: &'static str,
    /// Boot-scoped random value.
    boot_id: u64,
    /// Monotonic counter.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            prefix,
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues the next id.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016x}-{:016x}", self.prefix, self.boot_id, seq)
    }
}
