//! The byte-stream layer.
//!
//! Every backend moves through the same states: `Closed -> Open(Read | Write) -> Closed`.
//! Opening an already open stream closes the previous handle first, and dropping a
//! stream closes it, so handles are released on every exit path.

use std::io::SeekFrom;

use crate::error::{Result, StrandError};

/// Buffered plain file backend.
pub mod file;
/// Gzip (DEFLATE) file backend.
pub mod gzip;
/// In-memory buffer backend.
pub mod memory;

pub use file::FileStream;
pub use gzip::GzipStream;
pub use memory::MemoryStream;

/// Direction a stream was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Reading.
    Read,
    /// Writing.
    Write,
}

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No handle held.
    Closed,
    /// Handle held, open for the given direction.
    Open(StreamMode),
}

/// Uniform read/write/seek interface over every backend.
pub trait ByteStream {
    /// Current lifecycle state.
    fn state(&self) -> StreamState;

    /// Releases the handle. Closing a closed stream is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Reads up to `buf.len()` bytes, returning how many were read (0 at end).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes up to `buf.len()` bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Moves the cursor.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Cursor position in bytes from the start of the (decoded) stream.
    fn position(&self) -> u64;

    /// Total size, when the backend knows it.
    fn size(&self) -> Option<u64>;

    /// True if the stream is open in any direction.
    fn is_open(&self) -> bool {
        self.state() != StreamState::Closed
    }

    /// Fills `buf` completely.
    ///
    /// # Errors
    /// Returns [`StrandError::InvalidRead`] if the stream ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(StrandError::InvalidRead(format!(
                    "unexpected end of stream at {}: wanted {} bytes, got {filled}",
                    self.position(),
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes all of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(StrandError::Failed("stream accepted no bytes".into()));
            }
            written += n;
        }
        Ok(())
    }

    /// Reads until the end of the stream, appending to `out`.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        let mut chunk = vec![0u8; crate::constants::DEFAULT_BUFFER_SIZE];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            out.try_reserve(n)
                .map_err(|_| StrandError::alloc("stream tail", out.len() + n))?;
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out.len() - start)
    }
}

pub(crate) fn not_readable(what: &str) -> StrandError {
    StrandError::InvalidRead(format!("{what} is not open for reading"))
}

pub(crate) fn not_writable(what: &str) -> StrandError {
    StrandError::Failed(format!("{what} is not open for writing"))
}
