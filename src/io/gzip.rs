use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, SeekFrom, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::warn;

use super::{ByteStream, StreamMode, StreamState, not_readable, not_writable};
use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, StrandError};

enum Handle {
    Closed,
    Reader(GzDecoder<BufReader<File>>),
    Writer(GzEncoder<BufWriter<File>>),
}

/// A gzip-wrapped DEFLATE file.
///
/// Reading is forward-only: the decoded size is unknown and only forward seeks relative
/// to the current position are honoured (by decoding and discarding).
pub struct GzipStream {
    handle: Handle,
    position: u64,
    level: Compression,
}

impl GzipStream {
    /// Creates a closed stream that will compress at the default level.
    pub fn new() -> Self {
        Self {
            handle: Handle::Closed,
            position: 0,
            level: Compression::default(),
        }
    }

    /// Sets the compression level (0-9) used when writing.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Opens `path` for decoding.
    pub fn open_read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = Self::new();
        stream.open(path.as_ref(), StreamMode::Read)?;
        Ok(stream)
    }

    /// Creates `path` for encoding.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = Self::new();
        stream.open(path.as_ref(), StreamMode::Write)?;
        Ok(stream)
    }

    /// Opens `path`, closing any handle this stream already holds.
    pub fn open(&mut self, path: &Path, mode: StreamMode) -> Result<()> {
        if self.is_open() {
            self.close()?;
        }
        self.handle = match mode {
            StreamMode::Read => {
                let file = File::open(path)?;
                Handle::Reader(GzDecoder::new(BufReader::with_capacity(
                    DEFAULT_BUFFER_SIZE,
                    file,
                )))
            }
            StreamMode::Write => {
                let file = File::create(path)?;
                Handle::Writer(GzEncoder::new(
                    BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file),
                    self.level,
                ))
            }
        };
        self.position = 0;
        Ok(())
    }
}

impl Default for GzipStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GzipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipStream")
            .field("state", &self.state())
            .field("position", &self.position)
            .finish()
    }
}

fn decode_error(err: io::Error) -> StrandError {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            StrandError::Compression(format!("DEFLATE stream: {err}"))
        }
        _ => StrandError::from(err),
    }
}

impl ByteStream for GzipStream {
    fn state(&self) -> StreamState {
        match self.handle {
            Handle::Closed => StreamState::Closed,
            Handle::Reader(_) => StreamState::Open(StreamMode::Read),
            Handle::Writer(_) => StreamState::Open(StreamMode::Write),
        }
    }

    fn close(&mut self) -> Result<()> {
        let handle = std::mem::replace(&mut self.handle, Handle::Closed);
        if let Handle::Writer(encoder) = handle {
            let mut inner = encoder.finish()?;
            inner.flush()?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Handle::Reader(decoder) = &mut self.handle else {
            return Err(not_readable("gzip stream"));
        };
        let n = decoder.read(buf).map_err(decode_error)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Handle::Writer(encoder) = &mut self.handle else {
            return Err(not_writable("gzip stream"));
        };
        let n = encoder.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let skip = match pos {
            SeekFrom::Current(n) if n >= 0 => n as u64,
            SeekFrom::Start(n) if n >= self.position => n - self.position,
            _ => {
                return Err(StrandError::Unsupported(
                    "gzip streams only seek forward".into(),
                ));
            }
        };
        let mut scratch = [0u8; 512];
        let mut left = skip;
        while left > 0 {
            let want = left.min(scratch.len() as u64) as usize;
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
            left -= n as u64;
        }
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> Option<u64> {
        None
    }
}

impl Drop for GzipStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing gzip stream failed: {e}");
        }
    }
}
