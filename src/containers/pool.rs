use crate::error::{Result, StrandError};

/// A pool of byte buffers that a document hands back after relocation and reuses on the
/// next parse.
///
/// Retention is bounded: once `max_retained` buffers are held, returned buffers are
/// simply dropped. [`BufferPool::reset`] releases everything.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
    max_retained: usize,
    reused: u64,
}

impl BufferPool {
    /// Default number of buffers kept alive between parses.
    pub const DEFAULT_RETAINED: usize = 64;

    /// Creates a pool with the default retention bound.
    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_RETAINED)
    }

    /// Creates a pool that keeps at most `max_retained` buffers.
    pub fn with_limit(max_retained: usize) -> Self {
        Self {
            free: Vec::new(),
            max_retained,
            reused: 0,
        }
    }

    /// Hands out a zero-filled buffer of exactly `len` bytes.
    ///
    /// # Errors
    /// Returns [`StrandError::Allocation`] if the memory cannot be reserved.
    pub fn take(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = match self.free.iter().position(|b| b.capacity() >= len) {
            Some(i) => {
                self.reused += 1;
                self.free.swap_remove(i)
            }
            None => Vec::new(),
        };
        buf.clear();
        buf.try_reserve_exact(len)
            .map_err(|_| StrandError::alloc("pooled buffer", len))?;
        buf.resize(len, 0);
        Ok(buf)
    }

    /// Returns a buffer to the pool.
    pub fn give(&mut self, mut buf: Vec<u8>) {
        if buf.capacity() == 0 || self.free.len() >= self.max_retained {
            return;
        }
        buf.clear();
        self.free.push(buf);
    }

    /// Frees every retained buffer.
    pub fn reset(&mut self) {
        self.free = Vec::new();
    }

    /// Number of buffers currently retained.
    pub fn retained(&self) -> usize {
        self.free.len()
    }

    /// How many `take` calls were served from a retained buffer.
    pub fn reuse_count(&self) -> u64 {
        self.reused
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
