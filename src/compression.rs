//! Pluggable compression backend.
//!
//! A whole document, header included, may be wrapped in a gzip-compatible DEFLATE
//! stream or a zstd frame. This module defines the `Compressor`
//! trait, the three built-in codecs and a registry that detects which one a buffer uses
//! and falls back to the next codec when the preferred one fails.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;

use crate::error::{Result, StrandError};

/// zstd level used when writing.
const ZSTD_LEVEL: i32 = 3;

/// First guess at the decoded/encoded size ratio when sizing output buffers.
const INITIAL_EXPANSION: usize = 4;

/// Interface for compression algorithms.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Registry slot. 0 is reserved for no compression.
    fn id(&self) -> u8;

    /// Short name for reports.
    fn name(&self) -> &'static str;

    /// Returns true if `prefix` starts with this codec's magic bytes.
    fn matches(&self, prefix: &[u8]) -> bool;

    /// Compresses the data.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Decompresses the data.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

// --- No Compression (Pass-through) ---

/// Pass-through codec (ID 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn matches(&self, _prefix: &[u8]) -> bool {
        false
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

// --- DEFLATE (gzip framing) ---

/// Gzip-compatible DEFLATE codec (ID 1).
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor;

impl GzipCompressor {
    /// Gzip magic bytes.
    pub const MAGIC: [u8; 2] = [0x1f, 0x8b];
}

impl Compressor for GzipCompressor {
    fn id(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&Self::MAGIC)
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let out = encoder.finish()?;
        Ok(Cow::Owned(out))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut decoder = GzDecoder::new(data);
        let out = grow_read(&mut decoder, data.len(), "gzip")?;
        Ok(Cow::Owned(out))
    }
}

// --- zstd ---

/// zstd frame codec (ID 2).
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor;

impl ZstdCompressor {
    /// zstd frame magic bytes.
    pub const MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
}

impl Compressor for ZstdCompressor {
    fn id(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&Self::MAGIC)
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let out = zstd::encode_all(data, ZSTD_LEVEL)
            .map_err(|e| StrandError::Compression(format!("zstd: {e}")))?;
        Ok(Cow::Owned(out))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut decoder = zstd::stream::read::Decoder::with_buffer(data)
            .map_err(|e| StrandError::Compression(format!("zstd: {e}")))?
            .single_frame();
        let out = grow_read(&mut decoder, data.len(), "zstd")?;
        Ok(Cow::Owned(out))
    }
}

/// Decode loop shared by both codecs: the output buffer starts at a multiple of the
/// input size and doubles whenever it fills, until the decoder reports the end.
fn grow_read<R: Read>(decoder: &mut R, input_len: usize, codec: &str) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    let initial = input_len.saturating_mul(INITIAL_EXPANSION).max(1024);
    out.try_reserve_exact(initial)
        .map_err(|_| StrandError::alloc("decompression output", initial))?;

    loop {
        if out.len() == out.capacity() {
            let more = out.capacity().max(1024);
            out.try_reserve_exact(more)
                .map_err(|_| StrandError::alloc("decompression output", out.len() + more))?;
        }
        let filled = out.len();
        out.resize(out.capacity(), 0);
        match decoder.read(&mut out[filled..]) {
            Ok(0) => {
                out.truncate(filled);
                break;
            }
            Ok(n) => out.truncate(filled + n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => out.truncate(filled),
            Err(e) => return Err(StrandError::Compression(format!("{codec}: {e}"))),
        }
    }
    Ok(out)
}

// --- REGISTRY ---

/// Registry of compression algorithms, indexed by ID.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Creates a registry with the built-in codecs.
    ///
    /// *   ID 0: `NoCompression`
    /// *   ID 1: `GzipCompressor`
    /// *   ID 2: `ZstdCompressor`
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..4).map(|_| None).collect(),
        };
        reg.register(Box::new(NoCompression));
        reg.register(Box::new(GzipCompressor));
        reg.register(Box::new(ZstdCompressor));
        reg
    }

    /// Registers a compressor in the slot named by its ID, replacing any previous one.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = algo.id() as usize;
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a compressor by its ID.
    ///
    /// # Errors
    /// Returns `StrandError::Compression` if the ID is not registered.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        if let Some(algo) = self.algorithms.get(usize::from(id)).and_then(|o| o.as_ref()) {
            return Ok(algo.as_ref());
        }
        Err(StrandError::Compression(format!(
            "Algorithm ID {id} is not registered or available"
        )))
    }

    /// Finds the codec whose magic bytes start `prefix`.
    pub fn detect(&self, prefix: &[u8]) -> Option<&dyn Compressor> {
        self.algorithms
            .iter()
            .flatten()
            .find(|algo| algo.matches(prefix))
            .map(|algo| algo.as_ref())
    }

    /// Decompresses `data`, trying the detected (or `preferred`) codec first and, when
    /// `fallback` is set, every other registered codec after it.
    pub fn decompress_any(&self, data: &[u8], preferred: u8, fallback: bool) -> Result<Vec<u8>> {
        let first = match self.detect(data) {
            Some(algo) => algo,
            None => self.get(preferred)?,
        };

        let mut last_err = match first.decompress(data) {
            Ok(out) => return Ok(out.into_owned()),
            Err(e) => e,
        };
        if !fallback {
            return Err(last_err);
        }

        for algo in self.algorithms.iter().flatten() {
            if algo.id() == first.id() || algo.id() == NoCompression.id() {
                continue;
            }
            debug!("{} failed ({last_err}); trying {}", first.name(), algo.name());
            match algo.decompress(data) {
                Ok(out) => return Ok(out.into_owned()),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
