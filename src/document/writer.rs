use std::path::Path;

use log::{debug, info};

use super::Document;
use super::chunk::ChunkState;
use crate::config::SaveMode;
use crate::error::{Result, StrandError};
use crate::format::{
    ChunkCode, ChunkHeader, Endian, FileHeader, HeaderFlags, OldAddr, PointerWidth,
};
use crate::io::{ByteStream, FileStream, GzipStream};

/// Version written when the document has none of its own.
pub const DEFAULT_VERSION: u16 = 100;

impl Document {
    /// Writes the document in the current layout to `stream`: header, every relocated
    /// chunk, the current schema as `DNA1`, then `ENDB`.
    ///
    /// # Errors
    /// [`StrandError::Unsupported`] for a non-native `endian`; [`StrandError::Failed`]
    /// if nothing has been parsed.
    pub fn reflect(&self, stream: &mut dyn ByteStream, endian: Endian) -> Result<()> {
        if endian != Endian::native() {
            return Err(StrandError::Unsupported(format!(
                "writing {endian:?} documents on a {:?} host",
                Endian::native()
            )));
        }
        if self.file_schema.is_none() {
            return Err(StrandError::Failed("no parsed document to write".into()));
        }

        let pointer_width = self.memory.pointer_width();
        let version = self.header.as_ref().map_or(DEFAULT_VERSION, |h| h.version);
        let header = FileHeader::new(&self.config.signature, pointer_width, endian, version);
        stream.write_all(&header.to_bytes())?;

        let flags = HeaderFlags::new(pointer_width == PointerWidth::Eight, false, false);
        let mut buf = Vec::with_capacity(crate::constants::DEFAULT_BUFFER_SIZE);
        let mut written = 0usize;
        for chunk in &self.chunks {
            if chunk.state() != ChunkState::Relocated {
                continue;
            }
            let Some(data) = chunk.relocated() else {
                continue;
            };
            buf.clear();
            chunk.current_header().encode_into(flags, &mut buf)?;
            stream.write_all(&buf)?;
            stream.write_all(data)?;
            written += 1;
        }

        let blob = self.memory.blob();
        let schema = ChunkHeader {
            code: ChunkCode::DNA1,
            len: u32::try_from(blob.len())
                .map_err(|_| StrandError::Unsupported("schema blob above 4 GiB".into()))?,
            old: OldAddr::NULL,
            type_index: 0,
            count: 1,
        };
        stream.write_all(&schema.encode(flags)?)?;
        stream.write_all(blob)?;

        let end = ChunkHeader {
            code: ChunkCode::ENDB,
            len: 0,
            old: OldAddr::NULL,
            type_index: 0,
            count: 0,
        };
        stream.write_all(&end.encode(flags)?)?;

        debug!("reflected {written} chunks");
        Ok(())
    }

    /// Writes the document to `path` and, on success, releases every chunk buffer.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, mode: SaveMode) -> Result<()> {
        let path = path.as_ref();
        match mode {
            SaveMode::Uncompressed => {
                let mut stream = FileStream::create(path)?;
                self.reflect(&mut stream, Endian::native())?;
                stream.close()?;
            }
            SaveMode::Compressed => {
                let mut stream = GzipStream::create(path)?;
                self.reflect(&mut stream, Endian::native())?;
                stream.close()?;
            }
        }
        info!("saved {} ({mode:?})", path.display());
        self.clear();
        Ok(())
    }
}
