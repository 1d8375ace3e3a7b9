use serde::Serialize;

use crate::format::{ChunkCode, ChunkHeader, INVALID_CHUNK_LEN, OldAddr};

/// Where a chunk is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChunkState {
    /// Payload read, not yet relocated.
    Raw,
    /// Payload transcribed into the current layout.
    Relocated,
    /// Kept as read: its code or type is configured to be skipped.
    Skipped,
    /// Kept as read: its struct type has no counterpart.
    Unlinked,
}

/// One chunk of a document: its header, the payload as read and, once relocated, the
/// payload in the current layout.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub(crate) header: ChunkHeader,
    pub(crate) raw: Option<Vec<u8>>,
    pub(crate) relocated: Option<Vec<u8>>,
    pub(crate) memory_type: Option<u32>,
    pub(crate) state: ChunkState,
    pub(crate) modified: bool,
}

impl ChunkRecord {
    pub(crate) fn new(header: ChunkHeader, raw: Vec<u8>) -> Self {
        Self {
            header,
            raw: Some(raw),
            relocated: None,
            memory_type: None,
            state: ChunkState::Raw,
            modified: false,
        }
    }

    pub(crate) fn set_relocated(&mut self, data: Vec<u8>, memory_type: Option<u32>) {
        self.relocated = Some(data);
        self.memory_type = memory_type;
        self.state = ChunkState::Relocated;
        self.modified = true;
    }

    /// The header as read from the document.
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Record code.
    pub fn code(&self) -> ChunkCode {
        self.header.code
    }

    /// Old address, the key this chunk is found under.
    pub fn old(&self) -> OldAddr {
        self.header.old
    }

    /// Number of struct instances.
    pub fn count(&self) -> u32 {
        self.header.count
    }

    /// Struct index in the file schema.
    pub fn file_type(&self) -> u32 {
        self.header.type_index
    }

    /// Struct index in the current schema, once relocated against a linked struct.
    pub fn memory_type(&self) -> Option<u32> {
        self.memory_type
    }

    /// Lifecycle state.
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// True once the payload has been transcribed.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The payload as read. Released after relocation.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// The payload in the current layout.
    pub fn relocated(&self) -> Option<&[u8]> {
        self.relocated.as_deref()
    }

    /// Relocated payload if there is one, otherwise the payload as read.
    pub fn data(&self) -> Option<&[u8]> {
        self.relocated().or(self.raw())
    }

    /// The header describing [`ChunkRecord::data`].
    ///
    /// A payload too long for the length field carries the invalid-length sentinel.
    pub fn current_header(&self) -> ChunkHeader {
        let mut header = self.header;
        if let Some(data) = &self.relocated {
            header.len = u32::try_from(data.len()).unwrap_or(INVALID_CHUNK_LEN);
            if let Some(t) = self.memory_type {
                header.type_index = t;
            }
        }
        header
    }
}
