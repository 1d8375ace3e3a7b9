use crate::containers::{HashTable, TableKey};
use crate::format::OldAddr;
use crate::hash::wang_hash;

impl TableKey for OldAddr {
    fn table_hash(&self) -> u64 {
        wang_hash(self.0)
    }
}

/// Old address -> index of the chunk that carried it.
///
/// Keys are unique; the null address is never stored.
#[derive(Debug, Default)]
pub struct AddressMap {
    table: HashTable<OldAddr, usize>,
}

impl AddressMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk index stored for `old`.
    pub fn get(&self, old: OldAddr) -> Option<usize> {
        if old.is_null() {
            return None;
        }
        self.table.find(&old).copied()
    }

    /// True if `old` is mapped.
    pub fn contains(&self, old: OldAddr) -> bool {
        self.get(old).is_some()
    }

    /// Maps `old` to `chunk` unless it is null or already taken. Returns the chunk that
    /// already holds the address, if any.
    pub fn insert(&mut self, old: OldAddr, chunk: usize) -> Option<usize> {
        if old.is_null() {
            return None;
        }
        if let Some(existing) = self.table.find(&old) {
            return Some(*existing);
        }
        self.table.insert(old, chunk);
        None
    }

    /// Number of mapped addresses.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Forgets every address.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// All mapped addresses with their chunk index, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (OldAddr, usize)> + '_ {
        self.table.iter().map(|(k, v)| (*k, *v))
    }
}
