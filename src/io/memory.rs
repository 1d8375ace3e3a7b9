use std::io::SeekFrom;

use memmap2::Mmap;

use super::{ByteStream, StreamMode, StreamState, not_readable, not_writable};
use crate::error::{Result, StrandError};

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
    Mapped(Mmap),
}

impl Storage<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Borrowed(s) => s,
            Self::Mapped(m) => m,
        }
    }
}

/// An in-memory buffer.
///
/// Reads and seeks stay within the buffer's bounds. Writes grow an owned buffer with an
/// amortized reserve; writing to borrowed or mapped bytes copies them into an owned
/// buffer first.
pub struct MemoryStream<'a> {
    storage: Storage<'a>,
    position: usize,
    state: StreamState,
}

impl<'a> MemoryStream<'a> {
    /// A readable stream over borrowed bytes.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            storage: Storage::Borrowed(bytes),
            position: 0,
            state: StreamState::Open(StreamMode::Read),
        }
    }

    /// A readable stream over an owned buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(bytes),
            position: 0,
            state: StreamState::Open(StreamMode::Read),
        }
    }

    /// A readable stream over a memory-mapped file.
    pub fn from_mmap(map: Mmap) -> Self {
        Self {
            storage: Storage::Mapped(map),
            position: 0,
            state: StreamState::Open(StreamMode::Read),
        }
    }

    /// An empty stream open for writing.
    pub fn writer() -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
            position: 0,
            state: StreamState::Open(StreamMode::Write),
        }
    }

    /// Re-opens the stream in `mode` with the cursor at the start.
    pub fn reopen(&mut self, mode: StreamMode) {
        self.position = 0;
        self.state = StreamState::Open(mode);
    }

    /// The whole buffer.
    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_slice()
    }

    /// Bytes from the cursor to the end.
    pub fn remaining(&self) -> &[u8] {
        let data = self.storage.as_slice();
        &data[self.position.min(data.len())..]
    }

    /// Consumes the stream and returns its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        match self.storage {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s.to_vec(),
            Storage::Mapped(m) => m.to_vec(),
        }
    }

    fn owned_mut(&mut self) -> Result<&mut Vec<u8>> {
        if !matches!(self.storage, Storage::Owned(_)) {
            let data = self.storage.as_slice();
            let mut copy = Vec::new();
            copy.try_reserve_exact(data.len())
                .map_err(|_| StrandError::alloc("memory stream copy", data.len()))?;
            copy.extend_from_slice(data);
            self.storage = Storage::Owned(copy);
        }
        match &mut self.storage {
            Storage::Owned(v) => Ok(v),
            _ => Err(StrandError::Failed("memory stream storage is not owned".into())),
        }
    }
}

impl std::fmt::Debug for MemoryStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStream")
            .field("len", &self.storage.as_slice().len())
            .field("position", &self.position)
            .field("state", &self.state)
            .finish()
    }
}

impl ByteStream for MemoryStream<'_> {
    fn state(&self) -> StreamState {
        self.state
    }

    fn close(&mut self) -> Result<()> {
        self.state = StreamState::Closed;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state != StreamState::Open(StreamMode::Read) {
            return Err(not_readable("memory stream"));
        }
        let rest = self.remaining();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.state != StreamState::Open(StreamMode::Write) {
            return Err(not_writable("memory stream"));
        }
        let position = self.position;
        let data = self.owned_mut()?;
        let end = position + buf.len();
        if end > data.len() {
            if end > data.capacity() {
                // Amortized growth: at least half again of what is already held.
                let want = (end - data.len()).max(data.len() / 2);
                data.try_reserve(want)
                    .map_err(|_| StrandError::alloc("memory stream", end))?;
            }
            data.resize(end, 0);
        }
        data[position..end].copy_from_slice(buf);
        self.position = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.storage.as_slice().len() as i128;
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(n) => len + i128::from(n),
            SeekFrom::Current(n) => self.position as i128 + i128::from(n),
        };
        if target < 0 || target > len {
            return Err(StrandError::InvalidRead(format!(
                "seek to {target} outside buffer of {len} bytes"
            )));
        }
        self.position = target as usize;
        Ok(self.position as u64)
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn size(&self) -> Option<u64> {
        Some(self.storage.as_slice().len() as u64)
    }
}
