use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, StrandError};
use crate::hash::wang_hash;

/// Keys stored in a [`HashTable`] provide their own stable hash.
pub trait TableKey: Eq + fmt::Debug {
    /// Returns the hash that selects the bucket.
    fn table_hash(&self) -> u64;
}

impl TableKey for u64 {
    fn table_hash(&self) -> u64 {
        wang_hash(*self)
    }
}

impl TableKey for u32 {
    fn table_hash(&self) -> u64 {
        wang_hash(u64::from(*self))
    }
}

const NO_CACHE: u32 = u32::MAX;
const MIN_BUCKETS: usize = 16;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    next: Option<u32>,
}

/// Hash table with entries stored contiguously in an arena and bucket chains expressed
/// as indices into it.
///
/// `buckets[b]` holds the first entry of bucket `b`; each entry holds the index of the
/// next entry in the same bucket. The bucket count is always a power of two.
///
/// Removal swaps the last entry into the vacated slot, so an index stays valid until the
/// next removal. Iteration follows storage order, which is insertion order only until the
/// first removal.
pub struct HashTable<K, V> {
    entries: Vec<Entry<K, V>>,
    buckets: Vec<Option<u32>>,
    /// Index of the entry returned by the last successful lookup.
    last: AtomicU32,
}

impl<K: TableKey, V> HashTable<K, V> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty table sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = capacity.max(MIN_BUCKETS).next_power_of_two();
        Self {
            entries: Vec::with_capacity(capacity),
            buckets: vec![None; buckets],
            last: AtomicU32::new(NO_CACHE),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of buckets (always a power of two).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Returns the storage index of `key`, if present.
    pub fn find_index(&self, key: &K) -> Option<usize> {
        let cached = self.last.load(Ordering::Relaxed);
        if cached != NO_CACHE
            && let Some(entry) = self.entries.get(cached as usize)
            && entry.key == *key
        {
            return Some(cached as usize);
        }

        let hash = key.table_hash();
        let mut cursor = self.buckets[self.bucket_of(hash)];
        while let Some(idx) = cursor {
            let entry = &self.entries[idx as usize];
            if entry.hash == hash && entry.key == *key {
                self.last.store(idx, Ordering::Relaxed);
                return Some(idx as usize);
            }
            cursor = entry.next;
        }
        None
    }

    /// Looks up the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<&V> {
        self.find_index(key).map(|idx| &self.entries[idx].value)
    }

    /// Mutable lookup.
    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.find_index(key)?;
        Some(&mut self.entries[idx].value)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Inserts or replaces. Returns the previous value when `key` was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(idx) = self.find_index(&key) {
            return Some(std::mem::replace(&mut self.entries[idx].value, value));
        }
        self.push(key, value);
        None
    }

    /// Inserts a key that must not already be present.
    ///
    /// # Errors
    /// Returns [`StrandError::TableConflict`] if `key` is already stored.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<usize> {
        if self.find_index(&key).is_some() {
            return Err(StrandError::TableConflict(format!(
                "key {key:?} is already present"
            )));
        }
        Ok(self.push(key, value))
    }

    fn push(&mut self, key: K, value: V) -> usize {
        if self.entries.len() >= self.buckets.len() {
            self.rebuild(self.buckets.len() * 2);
        }
        let hash = key.table_hash();
        let bucket = self.bucket_of(hash);
        let idx = self.entries.len();
        self.entries.push(Entry {
            key,
            value,
            hash,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(idx as u32);
        idx
    }

    fn rebuild(&mut self, bucket_count: usize) {
        self.buckets = vec![None; bucket_count];
        for idx in 0..self.entries.len() {
            let bucket = self.bucket_of(self.entries[idx].hash);
            self.entries[idx].next = self.buckets[bucket];
            self.buckets[bucket] = Some(idx as u32);
        }
    }

    /// Removes `key`, moving the last entry into its slot.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.find_index(key)?;
        self.last.store(NO_CACHE, Ordering::Relaxed);
        self.unlink(idx);

        let tail = self.entries.len() - 1;
        if idx != tail {
            self.relink(tail, idx);
        }
        Some(self.entries.swap_remove(idx).value)
    }

    /// Drops `idx` out of its bucket chain.
    fn unlink(&mut self, idx: usize) {
        let bucket = self.bucket_of(self.entries[idx].hash);
        let next = self.entries[idx].next;
        let target = Some(idx as u32);

        if self.buckets[bucket] == target {
            self.buckets[bucket] = next;
            return;
        }
        let mut cursor = self.buckets[bucket];
        while let Some(c) = cursor {
            let entry = &mut self.entries[c as usize];
            if entry.next == target {
                entry.next = next;
                return;
            }
            cursor = entry.next;
        }
    }

    /// Rewrites the chain reference to `from` so it points at `to`.
    fn relink(&mut self, from: usize, to: usize) {
        let bucket = self.bucket_of(self.entries[from].hash);
        let source = Some(from as u32);

        if self.buckets[bucket] == source {
            self.buckets[bucket] = Some(to as u32);
            return;
        }
        let mut cursor = self.buckets[bucket];
        while let Some(c) = cursor {
            let entry = &mut self.entries[c as usize];
            if entry.next == source {
                entry.next = Some(to as u32);
                return;
            }
            cursor = entry.next;
        }
    }

    /// Removes every entry but keeps the bucket allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.last.store(NO_CACHE, Ordering::Relaxed);
    }

    /// Entry at storage index `idx`.
    pub fn get_index(&self, idx: usize) -> Option<(&K, &V)> {
        self.entries.get(idx).map(|e| (&e.key, &e.value))
    }

    /// Iterates entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|e| (&e.key, &e.value))
    }

    /// Iterates keys in storage order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Iterates values in storage order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|e| &e.value)
    }
}

impl<K: TableKey, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TableKey, V: fmt::Debug> fmt::Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
