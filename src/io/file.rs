use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{trace, warn};

use super::{ByteStream, StreamMode, StreamState, not_readable, not_writable};
use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::Result;

#[derive(Debug)]
enum Handle {
    Closed,
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// A buffered plain file.
///
/// The size is probed by seeking to the end when the file is opened for reading.
#[derive(Debug)]
pub struct FileStream {
    path: Option<PathBuf>,
    handle: Handle,
    size: u64,
    position: u64,
}

impl FileStream {
    /// Creates a closed stream.
    pub fn new() -> Self {
        Self {
            path: None,
            handle: Handle::Closed,
            size: 0,
            position: 0,
        }
    }

    /// Opens `path` for reading.
    pub fn open_read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = Self::new();
        stream.open(path.as_ref(), StreamMode::Read)?;
        Ok(stream)
    }

    /// Creates (truncating) `path` for writing.
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

        match mode {
            StreamMode::Read => {
                let mut file = File::open(path)?;
                self.size = file.seek(SeekFrom::End(0))?;
                file.seek(SeekFrom::Start(0))?;
                self.handle = Handle::Reader(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file));
            }
            StreamMode::Write => {
                let file = File::create(path)?;
                self.size = 0;
                self.handle = Handle::Writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));
            }
        }
        trace!("opened {} for {mode:?} ({} bytes)", path.display(), self.size);
        self.path = Some(path.to_path_buf());
        self.position = 0;
        Ok(())
    }

    /// Path of the open file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for FileStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStream for FileStream {
    fn state(&self) -> StreamState {
        match self.handle {
            Handle::Closed => StreamState::Closed,
            Handle::Reader(_) => StreamState::Open(StreamMode::Read),
            Handle::Writer(_) => StreamState::Open(StreamMode::Write),
        }
    }

    fn close(&mut self) -> Result<()> {
        let handle = std::mem::replace(&mut self.handle, Handle::Closed);
        self.path = None;
        if let Handle::Writer(mut writer) = handle {
            writer.flush()?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Handle::Reader(reader) = &mut self.handle else {
            return Err(not_readable("file stream"));
        };
        let n = reader.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Handle::Writer(writer) = &mut self.handle else {
            return Err(not_writable("file stream"));
        };
        let n = writer.write(buf)?;
        self.position += n as u64;
        self.size = self.size.max(self.position);
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = match &mut self.handle {
            Handle::Reader(reader) => reader.seek(pos)?,
            Handle::Writer(writer) => writer.seek(pos)?,
            Handle::Closed => return Err(not_readable("file stream")),
        };
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> Option<u64> {
        match self.handle {
            Handle::Closed => None,
            _ => Some(self.size),
        }
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing file stream failed: {e}");
        }
    }
}
