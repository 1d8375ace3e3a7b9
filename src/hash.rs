//! Stable hash functions.
//!
//! Names and type identifiers are hashed with FNV-1a so the same identifier hashes to
//! the same value in every schema and across runs. Numeric keys (old addresses, name
//! hashes used as table keys) go through Thomas Wang's 64-bit integer mix before they
//! pick a bucket.

use fnv::FnvHasher;
use std::hash::Hasher;

/// FNV-1a hash of an identifier.
pub fn name_hash(name: &str) -> u64 {
    bytes_hash(name.as_bytes())
}

/// FNV-1a hash of raw bytes.
pub fn bytes_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Thomas Wang's 64-bit integer mix.
pub fn wang_hash(key: u64) -> u64 {
    let mut key = (!key).wrapping_add(key << 21);
    key ^= key >> 24;
    key = key.wrapping_add(key << 3).wrapping_add(key << 8);
    key ^= key >> 14;
    key = key.wrapping_add(key << 2).wrapping_add(key << 4);
    key ^= key >> 28;
    key.wrapping_add(key << 31)
}
