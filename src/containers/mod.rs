//! Containers backing the schema tables and the address map.
//!
//! The hash table is an arena of entries with index-based bucket chains, and the pool
//! recycles payload buffers between parses.

/// Reusable byte-buffer pool.
pub mod pool;
/// Arena-backed hash table keyed by a stable hash.
pub mod table;

pub use pool::BufferPool;
pub use table::{HashTable, TableKey};
