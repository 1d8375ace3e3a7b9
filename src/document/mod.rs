//! Parsing, relocating and re-serializing documents.
//!
//! A [`Document`] drives one parse through these states:
//!
//! ```text
//! Header -> ScanningChunks -> LinkedSchema -> Done
//!                 |   ^
//!                 +---+  (data chunks)
//! ```
//!
//! Data chunks are read into pooled buffers and indexed by old address. When the schema
//! chunk arrives the file schema is compiled, linked against the current schema, and
//! every chunk read so far is relocated. Any error resets the document.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use memmap2::Mmap;
use serde::Serialize;

use crate::compression::{Compressor, CompressorRegistry, GzipCompressor, ZstdCompressor};
use crate::config::{DocumentConfig, DuplicatePolicy, ParseMode};
use crate::containers::BufferPool;
use crate::error::{Result, StrandError};
use crate::format::{ChunkCode, ChunkHeader, FileHeader, HeaderFlags, OldAddr};
use crate::io::{ByteStream, FileStream, GzipStream, MemoryStream};
use crate::link::{self, SchemaLink};
use crate::report::{LogReport, Report, ReportLevel};
use crate::schema::{CurrentSchema, SchemaTable};

/// Old address to chunk index map.
pub mod address;
/// Chunk records.
pub mod chunk;
/// Grouping and dispatch of relocated chunks.
pub mod records;
/// Payload transcription.
pub mod relocate;
/// Re-serialization.
pub mod writer;

pub use address::AddressMap;
pub use chunk::{ChunkRecord, ChunkState};
pub use records::{ChunkHandler, RecordLists};
pub use relocate::RelocateStats;

use relocate::Relocator;

/// Longest prefix inspected when guessing a file's framing.
const PREFIX_LEN: usize = 16;

/// Progress of the current parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParseState {
    /// Nothing read yet, or the last parse failed.
    Header,
    /// Reading data chunks.
    ScanningChunks,
    /// Schema compiled and linked; relocating.
    LinkedSchema,
    /// Every chunk relocated.
    Done,
}

/// A parsed document and the state needed to relocate and re-serialize it.
pub struct Document {
    memory: Arc<SchemaTable>,
    config: DocumentConfig,
    report: Arc<dyn Report>,
    registry: CompressorRegistry,
    pool: BufferPool,
    state: ParseState,
    header: Option<FileHeader>,
    flags: HeaderFlags,
    chunks: Vec<ChunkRecord>,
    addresses: AddressMap,
    file_schema: Option<SchemaTable>,
    link: Option<SchemaLink>,
    records: RecordLists,
    stats: RelocateStats,
    duplicates: usize,
}

impl Document {
    /// An empty document that relocates into `current`.
    ///
    /// # Errors
    /// Fails if the current schema does not compile.
    pub fn new(current: &CurrentSchema) -> Result<Self> {
        Ok(Self::with_table(current.get()?))
    }

    /// An empty document relocating into an already compiled table.
    pub fn with_table(memory: Arc<SchemaTable>) -> Self {
        Self {
            memory,
            config: DocumentConfig::default(),
            report: Arc::new(LogReport),
            registry: CompressorRegistry::new(),
            pool: BufferPool::new(),
            state: ParseState::Header,
            header: None,
            flags: HeaderFlags::default(),
            chunks: Vec::new(),
            addresses: AddressMap::new(),
            file_schema: None,
            link: None,
            records: RecordLists::default(),
            stats: RelocateStats::default(),
            duplicates: 0,
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: DocumentConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends report messages to `report` instead of the `log` facade.
    pub fn with_report(mut self, report: Arc<dyn Report>) -> Self {
        self.report = report;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    // --- Entry points ---

    /// Parses the file at `path`. With `detect_prefix` the framing is guessed from the
    /// first bytes (signature means plain, anything else compressed); without it the
    /// file is read as plain.
    pub fn parse_path<P: AsRef<Path>>(&mut self, path: P, detect_prefix: bool) -> Result<()> {
        let path = path.as_ref();
        let mode = if detect_prefix && !self.looks_plain(&read_prefix(path)?) {
            ParseMode::Compressed
        } else {
            ParseMode::Uncompressed
        };
        self.parse_file(path, mode)
    }

    /// Parses the file at `path` in `mode`.
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P, mode: ParseMode) -> Result<()> {
        let path = path.as_ref();
        debug!("parsing {} ({mode:?})", path.display());
        match mode {
            ParseMode::Uncompressed => {
                let mut stream = FileStream::open_read(path)?;
                let result = self.parse_stream(&mut stream, false);
                let closed = stream.close();
                result?;
                closed
            }
            ParseMode::Compressed => {
                let prefix = read_prefix(path)?;
                if GzipCompressor.matches(&prefix) || !self.config.fallback_decoder {
                    let mut stream = GzipStream::open_read(path)?;
                    let result = self.parse_stream(&mut stream, false);
                    let closed = stream.close();
                    result?;
                    return closed;
                }
                let mut data = Vec::new();
                FileStream::open_read(path)?.read_to_end(&mut data)?;
                let plain = self.decompress(&data, ZstdCompressor.id())?;
                self.parse_stream(&mut MemoryStream::from_vec(plain), false)
            }
            ParseMode::ReadToMemory => {
                let map = map_file(path)?;
                if self.looks_plain(&map) {
                    return self.parse_stream(&mut MemoryStream::from_mmap(map), false);
                }
                let plain = self.decompress(&map, GzipCompressor.id())?;
                self.parse_stream(&mut MemoryStream::from_vec(plain), false)
            }
        }
    }

    /// Parses a document held in memory.
    ///
    /// With `suppress_header_warning` an invalid header is returned as an error but not
    /// sent to the report sink.
    pub fn parse_bytes(
        &mut self,
        bytes: &[u8],
        mode: ParseMode,
        suppress_header_warning: bool,
    ) -> Result<()> {
        let plain = match mode {
            ParseMode::Uncompressed => None,
            ParseMode::Compressed => Some(self.decompress(bytes, GzipCompressor.id())?),
            ParseMode::ReadToMemory if self.looks_plain(bytes) => None,
            ParseMode::ReadToMemory => Some(self.decompress(bytes, GzipCompressor.id())?),
        };
        match plain {
            Some(plain) => {
                self.parse_stream(&mut MemoryStream::from_vec(plain), suppress_header_warning)
            }
            None => {
                self.parse_stream(&mut MemoryStream::from_slice(bytes), suppress_header_warning)
            }
        }
    }

    /// Parses from an open stream.
    pub fn parse_stream(
        &mut self,
        stream: &mut dyn ByteStream,
        suppress_header_warning: bool,
    ) -> Result<()> {
        self.clear();
        match self.scan(stream) {
            Ok(()) => Ok(()),
            Err(e) => {
                let header_error = matches!(e, StrandError::InvalidHeader(_));
                if !(header_error && suppress_header_warning) {
                    self.report.report(ReportLevel::Error, &format!("parse failed: {e}"));
                }
                self.clear();
                Err(e)
            }
        }
    }

    fn looks_plain(&self, prefix: &[u8]) -> bool {
        let sig = &self.config.signature;
        !sig.is_empty() && prefix.starts_with(&sig[..sig.len() - 1])
    }

    fn decompress(&self, data: &[u8], preferred: u8) -> Result<Vec<u8>> {
        self.registry
            .decompress_any(data, preferred, self.config.fallback_decoder)
    }

    // --- Scan ---

    fn scan(&mut self, stream: &mut dyn ByteStream) -> Result<()> {
        // 1. Header
        let header = FileHeader::read(stream, &self.config.signature)?;
        self.flags = header.flags(self.memory.pointer_width());
        debug!(
            "header {} (stripped: {}, flags: {:#05b})",
            header.as_text(),
            header.stripped,
            self.flags.as_u8()
        );
        self.header = Some(header);
        self.state = ParseState::ScanningChunks;

        // 2. Chunks until the schema
        let size = ChunkHeader::size(self.flags);
        let mut raw = [0u8; ChunkHeader::SIZE_64];
        loop {
            stream.read_exact(&mut raw[..size])?;

            if raw[..4] == ChunkCode::SDNA.to_bytes() {
                // Bare schema: the bytes taken for a header open the blob.
                let mut blob = raw[..size].to_vec();
                stream.read_to_end(&mut blob)?;
                return self.link_schema(&blob);
            }

            let chunk = ChunkHeader::decode(&raw[..size], self.flags)?;
            match chunk.code {
                ChunkCode::DNA1 => {
                    let blob = self.read_payload(stream, &chunk)?;
                    let result = self.link_schema(&blob);
                    self.pool.give(blob);
                    return result;
                }
                ChunkCode::ENDB => {
                    return Err(StrandError::LinkFailure(
                        "document ended without a schema".into(),
                    ));
                }
                _ => {
                    let payload = self.read_payload(stream, &chunk)?;
                    self.record(chunk, payload)?;
                }
            }
        }
    }

    fn read_payload(
        &mut self,
        stream: &mut dyn ByteStream,
        chunk: &ChunkHeader,
    ) -> Result<Vec<u8>> {
        if chunk.len > self.config.max_chunk_len {
            return Err(StrandError::InvalidChunkLength {
                code: chunk.code.to_string(),
                len: chunk.len,
            });
        }
        let mut payload = self.pool.take(chunk.len as usize)?;
        stream.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn record(&mut self, chunk: ChunkHeader, payload: Vec<u8>) -> Result<()> {
        let index = self.chunks.len();
        if let Some(existing) = self.addresses.insert(chunk.old, index) {
            if self.config.duplicate_policy == DuplicatePolicy::CompareContent {
                let kept = self.chunks[existing].raw().unwrap_or_default();
                if kept != payload.as_slice() {
                    return Err(StrandError::TableConflict(format!(
                        "chunks {} and {} share address {} with different content",
                        self.chunks[existing].code(),
                        chunk.code,
                        chunk.old
                    )));
                }
            }
            self.report.report(
                ReportLevel::Debug,
                &format!("dropped duplicate chunk {} at {}", chunk.code, chunk.old),
            );
            self.duplicates += 1;
            self.pool.give(payload);
            return Ok(());
        }
        self.chunks.push(ChunkRecord::new(chunk, payload));
        Ok(())
    }

    // --- Link and relocate ---

    fn link_schema(&mut self, blob: &[u8]) -> Result<()> {
        let Some(header) = &self.header else {
            return Err(StrandError::Failed("schema before header".into()));
        };
        let (pointer_width, endian) = (header.pointer_width, header.endian);

        let mut file = SchemaTable::compile(blob, pointer_width, endian)?;
        let link = link::link(
            &mut file,
            &self.memory,
            &self.config.sentinel_type,
            self.report.as_ref(),
        )?;
        self.state = ParseState::LinkedSchema;

        let mut relocator = Relocator {
            file: &file,
            memory: self.memory.as_ref(),
            link: &link,
            addresses: &self.addresses,
            config: &self.config,
            report: self.report.as_ref(),
            file_endian: endian,
            stats: RelocateStats::default(),
        };
        relocator.run(&mut self.chunks, &mut self.pool)?;
        self.stats = relocator.stats;

        self.records = RecordLists::build(&self.chunks);
        self.file_schema = Some(file);
        self.link = Some(link);
        self.state = ParseState::Done;

        self.report.report(
            ReportLevel::Info,
            &format!(
                "relocated {} chunks ({} opaque, {} pointer arrays, {} skipped, {} unlinked)",
                self.stats.structs,
                self.stats.opaque,
                self.stats.pointer_arrays,
                self.stats.skipped,
                self.stats.unlinked
            ),
        );
        Ok(())
    }

    // --- Accessors ---

    /// Progress of the last parse.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The parsed header.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// The header as text, e.g. `STRAND!-v300`.
    pub fn header_string(&self) -> Option<String> {
        self.header.as_ref().map(FileHeader::as_text)
    }

    /// Version number from the header.
    pub fn version(&self) -> Option<u16> {
        self.header.as_ref().map(|h| h.version)
    }

    /// Chunk codec flags derived from the header.
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    /// Every kept chunk, in document order.
    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    /// The old address map.
    pub fn addresses(&self) -> &AddressMap {
        &self.addresses
    }

    /// The schema the document was written with.
    pub fn file_schema(&self) -> Option<&SchemaTable> {
        self.file_schema.as_ref()
    }

    /// The schema chunks are relocated into.
    pub fn memory_schema(&self) -> &SchemaTable {
        &self.memory
    }

    /// The link between the two schemas.
    pub fn link(&self) -> Option<&SchemaLink> {
        self.link.as_ref()
    }

    /// Relocation counters of the last parse.
    pub fn relocate_stats(&self) -> RelocateStats {
        self.stats
    }

    /// Number of chunks dropped for reusing an address.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Relocated chunks grouped by code.
    pub fn record_lists(&self) -> &RecordLists {
        &self.records
    }

    /// Relocated chunks with `code`, in document order.
    pub fn records(&self, code: ChunkCode) -> impl Iterator<Item = &ChunkRecord> + '_ {
        self.records.get(code).iter().map(|i| &self.chunks[*i])
    }

    /// The chunk a relocated pointer value refers to.
    pub fn resolve(&self, pointer: u64) -> Option<&ChunkRecord> {
        let index = self.addresses.get(OldAddr(pointer))?;
        self.chunks.get(index)
    }

    /// Feeds every relocated chunk to the handler registered for its code. Returns the
    /// number of chunks handled.
    pub fn dispatch(&self, handlers: &mut [&mut dyn ChunkHandler]) -> Result<usize> {
        let mut handled = 0;
        for handler in handlers.iter_mut() {
            for &index in self.records.get(handler.code()) {
                handler.handle(&self.chunks[index], &self.memory)?;
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Releases every chunk buffer and forgets the parse.
    pub fn clear(&mut self) {
        for chunk in self.chunks.drain(..) {
            if let Some(raw) = chunk.raw {
                self.pool.give(raw);
            }
            if let Some(relocated) = chunk.relocated {
                self.pool.give(relocated);
            }
        }
        self.addresses.clear();
        self.records.clear();
        self.file_schema = None;
        self.link = None;
        self.header = None;
        self.flags = HeaderFlags::default();
        self.stats = RelocateStats::default();
        self.duplicates = 0;
        self.state = ParseState::Header;
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("state", &self.state)
            .field("header", &self.header_string())
            .field("chunks", &self.chunks.len())
            .field("addresses", &self.addresses.len())
            .field("linked", &self.link.is_some())
            .finish()
    }
}

fn read_prefix(path: &Path) -> Result<Vec<u8>> {
    let mut stream = FileStream::open_read(path)?;
    let mut prefix = vec![0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = stream.read(&mut prefix[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    prefix.truncate(filled);
    stream.close()?;
    Ok(prefix)
}

#[allow(unsafe_code)]
fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // Safety: the map is read-only and dropped before the parse returns. Truncating the
    // file meanwhile is outside this crate's control.
    let map = unsafe { Mmap::map(&file)? };
    info!("mapped {} ({} bytes)", path.display(), map.len());
    Ok(map)
}
