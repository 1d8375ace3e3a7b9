//! Document configuration.

use serde::{Deserialize, Serialize};

use crate::format::{ChunkCode, DEFAULT_SIGNATURE};

/// Default cap on a single chunk payload (1 GiB).
pub const DEFAULT_MAX_CHUNK_LEN: u32 = 1 << 30;

/// Default name of the opaque-blob struct type.
pub const DEFAULT_SENTINEL_TYPE: &str = "Link";

/// What to do with a chunk whose old address is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Keep the first chunk and discard the later one.
    #[default]
    Drop,
    /// Discard the later chunk if both payloads are identical, otherwise fail with
    /// [`StrandError::TableConflict`](crate::StrandError::TableConflict).
    CompareContent,
}

/// How a document is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// Plain chunk stream.
    Uncompressed,
    /// Gzip-wrapped stream, falling back to zstd when so configured.
    Compressed,
    /// Load (or map) the whole input into memory, detecting compression from its prefix.
    ReadToMemory,
}

/// How a document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveMode {
    /// Plain chunk stream.
    #[default]
    Uncompressed,
    /// Gzip-wrapped stream.
    Compressed,
}

/// Tunables of a [`Document`](crate::Document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Full signature. Its prefix without the last byte is the stripped form.
    pub signature: Vec<u8>,
    /// Struct type whose chunks are copied as opaque blobs.
    pub sentinel_type: String,
    /// Handling of chunks that reuse an old address.
    pub duplicate_policy: DuplicatePolicy,
    /// Try the other codec when the selected one fails to decode.
    pub fallback_decoder: bool,
    /// Chunk codes that are kept but not relocated.
    pub skip_codes: Vec<ChunkCode>,
    /// Struct type names whose chunks are kept but not relocated.
    pub skip_types: Vec<String>,
    /// Largest accepted chunk payload.
    pub max_chunk_len: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            signature: DEFAULT_SIGNATURE.to_vec(),
            sentinel_type: DEFAULT_SENTINEL_TYPE.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            fallback_decoder: true,
            skip_codes: Vec::new(),
            skip_types: Vec::new(),
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
        }
    }
}

impl DocumentConfig {
    /// Uses `signature` as the full signature.
    pub fn with_signature(mut self, signature: &[u8]) -> Self {
        self.signature = signature.to_vec();
        self
    }

    /// Names the opaque-blob struct type.
    pub fn with_sentinel_type(mut self, name: &str) -> Self {
        self.sentinel_type = name.to_string();
        self
    }

    /// Sets the duplicate-address policy.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Enables or disables the fallback decoder.
    pub fn with_fallback_decoder(mut self, enabled: bool) -> Self {
        self.fallback_decoder = enabled;
        self
    }

    /// Leaves chunks with `code` unrelocated.
    pub fn skip_code(mut self, code: ChunkCode) -> Self {
        self.skip_codes.push(code);
        self
    }

    /// Leaves chunks of struct type `name` unrelocated.
    pub fn skip_type(mut self, name: &str) -> Self {
        self.skip_types.push(name.to_string());
        self
    }

    /// Caps a single chunk payload at `len` bytes.
    pub fn with_max_chunk_len(mut self, len: u32) -> Self {
        self.max_chunk_len = len;
        self
    }
}
