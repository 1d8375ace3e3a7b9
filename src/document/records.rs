use super::chunk::{ChunkRecord, ChunkState};
use crate::containers::HashTable;
use crate::error::Result;
use crate::format::ChunkCode;
use crate::schema::SchemaTable;

/// Receives the relocated chunks of one code.
///
/// Implementations turn current-layout bytes into typed application records.
pub trait ChunkHandler {
    /// The code this handler consumes.
    fn code(&self) -> ChunkCode;

    /// Handles one relocated chunk. `schema` is the current schema the bytes follow.
    fn handle(&mut self, record: &ChunkRecord, schema: &SchemaTable) -> Result<()>;
}

/// Relocated chunk indices grouped by chunk code, in document order.
#[derive(Debug, Default)]
pub struct RecordLists {
    lists: HashTable<u32, Vec<usize>>,
}

impl RecordLists {
    /// Groups every relocated chunk of `chunks`.
    pub fn build(chunks: &[ChunkRecord]) -> Self {
        let mut lists: HashTable<u32, Vec<usize>> = HashTable::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.state() != ChunkState::Relocated {
                continue;
            }
            let code = chunk.code().as_u32();
            match lists.find_mut(&code) {
                Some(list) => list.push(index),
                None => {
                    lists.insert(code, vec![index]);
                }
            }
        }
        Self { lists }
    }

    /// Chunk indices carrying `code`.
    pub fn get(&self, code: ChunkCode) -> &[usize] {
        self.lists
            .find(&code.as_u32())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every code with at least one relocated chunk.
    pub fn codes(&self) -> impl Iterator<Item = ChunkCode> + '_ {
        self.lists.keys().map(|c| ChunkCode::from_u32(*c))
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// True if no chunk was relocated.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Forgets every list.
    pub fn clear(&mut self) {
        self.lists.clear();
    }
}
