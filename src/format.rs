//! Defines the physical binary layout of Strand documents.
//!
//! # Layout
//! A document is a short ASCII header followed by a flat sequence of chunks:
//!
//! `[Header] [Chunk] [Chunk] ... [DNA1 Chunk] [ENDB Chunk]`
//!
//! ## Header
//! `SIG[7] PTR[1] END[1] VERSION[3]`, where `PTR` is `_` for 32-bit and `-` for 64-bit
//! pointers and `END` is `v` for little and `V` for big endian. A stripped header carries
//! only the first six signature bytes.
//!
//! ## Chunk Anatomy
//! `code:u32 len:u32 old:u32|u64 type:u32 count:u32`, followed by `len` payload bytes.
//! The header is 20 bytes with 32-bit addresses and 24 bytes with 64-bit addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandError};
use crate::io::ByteStream;

/// The default document signature.
pub const DEFAULT_SIGNATURE: &[u8] = b"STRAND!";

/// Payload length reserved as the "invalid size" sentinel.
pub const INVALID_CHUNK_LEN: u32 = u32::MAX;

/// A four-character chunk code.
///
/// The four raw bytes are read as a little-endian `u32`, so the value does not depend on
/// the document's byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCode(u32);

impl ChunkCode {
    /// Schema chunk.
    pub const DNA1: Self = Self::from_bytes(*b"DNA1");
    /// End-of-document chunk.
    pub const ENDB: Self = Self::from_bytes(*b"ENDB");
    /// Generic data chunk.
    pub const DATA: Self = Self::from_bytes(*b"DATA");
    /// Bare schema blob tag, seen when a schema follows without its own chunk header.
    pub const SDNA: Self = Self::from_bytes(*b"SDNA");

    /// Builds a code from its four characters.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Builds a code from its raw numeric value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Builds a code from up to four ASCII characters, zero-padded.
    pub fn from_name(name: &str) -> Self {
        let mut bytes = [0u8; 4];
        for (dst, src) in bytes.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        Self::from_bytes(bytes)
    }

    /// The four raw bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// The raw numeric value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Applies the legacy short-code rule: a code whose two leading bytes are zero is
    /// shifted down by 16 bits.
    pub const fn normalized(self) -> Self {
        if self.0 & 0xFFFF == 0 {
            Self(self.0 >> 16)
        } else {
            self
        }
    }
}

impl fmt::Display for ChunkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            if b == 0 {
                break;
            }
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkCode({self})")
    }
}

/// Width of a pointer in a document or in the current program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    /// 32-bit pointers.
    Four,
    /// 64-bit pointers.
    Eight,
}

impl PointerWidth {
    /// Pointer width of the host.
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Eight
        } else {
            Self::Four
        }
    }

    /// Size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Header marker byte.
    pub const fn marker(self) -> u8 {
        match self {
            Self::Four => b'_',
            Self::Eight => b'-',
        }
    }

    fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            b'_' => Some(Self::Four),
            b'-' => Some(Self::Eight),
            _ => None,
        }
    }
}

/// Byte order of a document or of the current program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Header marker byte.
    pub const fn marker(self) -> u8 {
        match self {
            Self::Little => b'v',
            Self::Big => b'V',
        }
    }

    fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            b'v' => Some(Self::Little),
            b'V' => Some(Self::Big),
            _ => None,
        }
    }

    /// The other byte order.
    pub const fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// Reads a `u16` in this byte order. `bytes` must hold at least two bytes.
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        }
    }

    /// Reads a `u32` in this byte order. `bytes` must hold at least four bytes.
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }

    /// Reads a `u64` in this byte order. `bytes` must hold at least eight bytes.
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            Self::Little => u64::from_le_bytes(raw),
            Self::Big => u64::from_be_bytes(raw),
        }
    }

    /// Appends a `u16` in this byte order.
    pub fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            Self::Little => out.extend_from_slice(&value.to_le_bytes()),
            Self::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Appends a `u32` in this byte order.
    pub fn put_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            Self::Little => out.extend_from_slice(&value.to_le_bytes()),
            Self::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Appends a `u64` in this byte order.
    pub fn put_u64(self, out: &mut Vec<u8>, value: u64) {
        match self {
            Self::Little => out.extend_from_slice(&value.to_le_bytes()),
            Self::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// The document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// Signature bytes as found in the document.
    pub signature: Vec<u8>,
    /// True when the document used the shortened signature.
    pub stripped: bool,
    /// Pointer width of the writing program.
    pub pointer_width: PointerWidth,
    /// Byte order of the writing program.
    pub endian: Endian,
    /// Three-digit version number.
    pub version: u16,
}

impl FileHeader {
    /// Creates a full (non-stripped) header.
    pub fn new(
        signature: &[u8],
        pointer_width: PointerWidth,
        endian: Endian,
        version: u16,
    ) -> Self {
        Self {
            signature: signature.to_vec(),
            stripped: false,
            pointer_width,
            endian,
            version,
        }
    }

    /// Reads and validates the header from the start of `stream`.
    ///
    /// `signature` is the full form; its prefix without the last byte is accepted as the
    /// stripped form.
    pub fn read(stream: &mut dyn ByteStream, signature: &[u8]) -> Result<Self> {
        let sig_len = signature.len();
        if !(2..=16).contains(&sig_len) {
            return Err(StrandError::InvalidHeader(format!(
                "configured signature has {sig_len} bytes"
            )));
        }

        let mut lead = vec![0u8; sig_len];
        stream.read_exact(&mut lead)?;

        let (stripped, markers) = if lead == signature {
            let mut rest = [0u8; 5];
            stream.read_exact(&mut rest)?;
            (false, rest)
        } else if lead[..sig_len - 1] == signature[..sig_len - 1] {
            // The byte we took as the last signature byte is the pointer marker.
            let mut rest = [0u8; 5];
            rest[0] = lead[sig_len - 1];
            stream.read_exact(&mut rest[1..])?;
            (true, rest)
        } else {
            return Err(StrandError::InvalidHeader(format!(
                "unknown signature '{}'",
                String::from_utf8_lossy(&lead)
            )));
        };

        let pointer_width = PointerWidth::from_marker(markers[0]).ok_or_else(|| {
            StrandError::InvalidHeader(format!("bad pointer marker {:#04x}", markers[0]))
        })?;
        let endian = Endian::from_marker(markers[1]).ok_or_else(|| {
            StrandError::InvalidHeader(format!("bad endian marker {:#04x}", markers[1]))
        })?;

        let mut version = 0u16;
        for digit in &markers[2..5] {
            if !digit.is_ascii_digit() {
                return Err(StrandError::InvalidHeader(format!(
                    "bad version digit {digit:#04x}"
                )));
            }
            version = version * 10 + u16::from(digit - b'0');
        }

        let signature = if stripped {
            signature[..sig_len - 1].to_vec()
        } else {
            signature.to_vec()
        };

        Ok(Self {
            signature,
            stripped,
            pointer_width,
            endian,
            version,
        })
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.signature.len() + 5);
        buf.extend_from_slice(&self.signature);
        buf.push(self.pointer_width.marker());
        buf.push(self.endian.marker());
        let v = self.version.min(999);
        buf.push(b'0' + (v / 100) as u8);
        buf.push(b'0' + (v / 10 % 10) as u8);
        buf.push(b'0' + (v % 10) as u8);
        buf
    }

    /// The header as text, e.g. `STRAND!-v300`.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    /// Chunk codec flags for reading this document on a host whose pointers are
    /// `native` wide.
    pub fn flags(&self, native: PointerWidth) -> HeaderFlags {
        HeaderFlags::new(
            self.pointer_width == PointerWidth::Eight,
            self.pointer_width != native,
            self.endian != Endian::native(),
        )
    }
}

/// Chunk codec flags derived from the header, stored as one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    const CHUNK_64_MASK: u8 = 0b0000_0001; // Bit 0
    const VAR_BITS_MASK: u8 = 0b0000_0010; // Bit 1
    const ENDIAN_SWAP_MASK: u8 = 0b0000_0100; // Bit 2

    /// Creates the flag byte.
    pub fn new(chunk_64: bool, var_bits: bool, endian_swap: bool) -> Self {
        let mut byte = 0;
        if chunk_64 {
            byte |= Self::CHUNK_64_MASK;
        }
        if var_bits {
            byte |= Self::VAR_BITS_MASK;
        }
        if endian_swap {
            byte |= Self::ENDIAN_SWAP_MASK;
        }
        Self(byte)
    }

    /// Flags for a document written by this host.
    pub fn native() -> Self {
        Self::new(PointerWidth::native() == PointerWidth::Eight, false, false)
    }

    /// Chunk headers carry 64-bit old addresses.
    pub fn is_chunk_64(&self) -> bool {
        (self.0 & Self::CHUNK_64_MASK) != 0
    }

    /// The document's pointer width differs from the host's.
    pub fn is_var_bits(&self) -> bool {
        (self.0 & Self::VAR_BITS_MASK) != 0
    }

    /// The document's byte order differs from the host's.
    pub fn is_endian_swap(&self) -> bool {
        (self.0 & Self::ENDIAN_SWAP_MASK) != 0
    }

    /// Byte order of numeric fields under these flags.
    pub fn endian(&self) -> Endian {
        if self.is_endian_swap() {
            Endian::native().swapped()
        } else {
            Endian::native()
        }
    }

    /// Raw byte representation.
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// An address recorded by the program that wrote a document.
///
/// It is only an identifier: it keys the address map and is never dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct OldAddr(pub u64);

impl OldAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// True for the null address.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for OldAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OldAddr({:#x})", self.0)
    }
}

impl fmt::Display for OldAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A chunk header normalized to one in-memory shape regardless of the document's
/// pointer width and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Record code.
    pub code: ChunkCode,
    /// Payload length in bytes.
    pub len: u32,
    /// Address of the block in the writing program.
    pub old: OldAddr,
    /// Index of the payload's struct in the schema.
    pub type_index: u32,
    /// Number of struct instances in the payload.
    pub count: u32,
}

impl ChunkHeader {
    /// Encoded size with 32-bit addresses.
    pub const SIZE_32: usize = 20;
    /// Encoded size with 64-bit addresses.
    pub const SIZE_64: usize = 24;

    /// Encoded size under `flags`.
    pub fn size(flags: HeaderFlags) -> usize {
        if flags.is_chunk_64() {
            Self::SIZE_64
        } else {
            Self::SIZE_32
        }
    }

    /// Decodes a header. `bytes` must hold [`ChunkHeader::size`] bytes.
    ///
    /// # Errors
    /// Returns [`StrandError::InvalidChunkLength`] for the invalid-size sentinel.
    pub fn decode(bytes: &[u8], flags: HeaderFlags) -> Result<Self> {
        let size = Self::size(flags);
        if bytes.len() < size {
            return Err(StrandError::InvalidRead(format!(
                "chunk header needs {size} bytes, got {}",
                bytes.len()
            )));
        }

        let endian = flags.endian();
        let code = ChunkCode::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).normalized();
        let len = endian.read_u32(&bytes[4..8]);
        if len == INVALID_CHUNK_LEN {
            return Err(StrandError::InvalidChunkLength {
                code: code.to_string(),
                len,
            });
        }

        // The address is read whole in the document's byte order, so its halves are
        // reassembled rather than swapped individually.
        let (old, tail) = if flags.is_chunk_64() {
            (endian.read_u64(&bytes[8..16]), &bytes[16..24])
        } else {
            (u64::from(endian.read_u32(&bytes[8..12])), &bytes[12..20])
        };

        Ok(Self {
            code,
            len,
            old: OldAddr(old),
            type_index: endian.read_u32(&tail[0..4]),
            count: endian.read_u32(&tail[4..8]),
        })
    }

    /// Reads and decodes a header from `stream`, returning the raw bytes alongside.
    pub fn read(stream: &mut dyn ByteStream, flags: HeaderFlags) -> Result<(Self, [u8; 24])> {
        let mut raw = [0u8; Self::SIZE_64];
        let size = Self::size(flags);
        stream.read_exact(&mut raw[..size])?;
        let header = Self::decode(&raw[..size], flags)?;
        Ok((header, raw))
    }

    /// Appends the encoded header to `out`.
    ///
    /// # Errors
    /// Returns [`StrandError::Unsupported`] if a 32-bit header cannot hold the address.
    pub fn encode_into(&self, flags: HeaderFlags, out: &mut Vec<u8>) -> Result<()> {
        let endian = flags.endian();
        out.extend_from_slice(&self.code.to_bytes());
        endian.put_u32(out, self.len);
        if flags.is_chunk_64() {
            endian.put_u64(out, self.old.0);
        } else {
            let old = u32::try_from(self.old.0).map_err(|_| {
                StrandError::Unsupported(format!(
                    "address {} does not fit a 32-bit chunk header",
                    self.old
                ))
            })?;
            endian.put_u32(out, old);
        }
        endian.put_u32(out, self.type_index);
        endian.put_u32(out, self.count);
        Ok(())
    }

    /// Encodes the header into a fresh buffer.
    pub fn encode(&self, flags: HeaderFlags) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::size(flags));
        self.encode_into(flags, &mut out)?;
        Ok(out)
    }
}
