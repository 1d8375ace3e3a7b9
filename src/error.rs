//! Centralized error handling for Strand.
//!
//! Every failure in the codec is reported through [`StrandError`]; the library never
//! panics on malformed input. Parsing is fail-fast: the first error aborts the scan and
//! the document drops whatever partial state it had built.
//!
//! ## Error Categories
//!
//! - **I/O** ([`StrandError::Io`]): the underlying file or buffer failed.
//! - **Invalid read** ([`StrandError::InvalidRead`]): a short read or a read from a
//!   stream that is not open for reading.
//! - **Allocation** ([`StrandError::Allocation`]): a payload-sized buffer could not be
//!   reserved.
//! - **Invalid chunk length** ([`StrandError::InvalidChunkLength`]): a chunk header
//!   carried the invalid-size sentinel or exceeded the configured cap.
//! - **Invalid header** ([`StrandError::InvalidHeader`]): the leading signature,
//!   pointer marker, endian marker or version digits are wrong.
//! - **Table conflict** ([`StrandError::TableConflict`]): a duplicate key reached a table
//!   that requires unique keys.
//! - **Link failure** ([`StrandError::LinkFailure`]): a schema compiled to zero structs or
//!   the document never carried a schema.
//!
//! Structural drift between schemas (misaligned structs, missing members) is not an
//! error. It is recorded as flags and degrades to zero-filled output.
//!
//! ## Usage
//!
//! ```rust
//! use strand::{Document, CurrentSchema, StrandError, schema::SchemaBuilder, format::PointerWidth};
//!
//! let blob = SchemaBuilder::new(PointerWidth::native())
//!     .with_primitives()
//!     .structure("Point", &[("int", "x"), ("int", "y")])
//!     .build()?;
//! let current = CurrentSchema::new(blob);
//! let mut doc = Document::new(&current)?;
//!
//! match doc.parse_bytes(b"not a document", strand::ParseMode::Uncompressed, true) {
//!     Err(StrandError::InvalidHeader(msg)) => println!("rejected: {msg}"),
//!     other => println!("unexpected: {other:?}"),
//! }
//! # Ok::<(), StrandError>(())
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Strand operations.
pub type Result<T> = std::result::Result<T, StrandError>;

/// The master error enum covering all failure domains in Strand.
///
/// This type is `Clone` so a document can hand the same error to a report sink and to
/// the caller. I/O errors are wrapped in an `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum StrandError {
    /// Low-level I/O failure from the file system or an in-memory writer.
    Io(Arc<io::Error>),

    /// A buffer of the requested size could not be reserved.
    Allocation(String),

    /// A read came up short, or the stream was not in a readable state.
    InvalidRead(String),

    /// A chunk header declared the invalid-size sentinel, or a length over the cap.
    InvalidChunkLength {
        /// Printable chunk code.
        code: String,
        /// The declared payload length.
        len: u32,
    },

    /// The file header did not match the configured signature or markers.
    InvalidHeader(String),

    /// A key was inserted twice into a table that requires unique keys.
    TableConflict(String),

    /// The schema linker had nothing to link.
    LinkFailure(String),

    /// The schema descriptor blob is malformed or exceeds the table caps.
    Schema(String),

    /// A DEFLATE or zstd stream could not be decoded (or encoded).
    Compression(String),

    /// The caller asked for something this codec does not do.
    Unsupported(String),

    /// Generic failure fallback.
    Failed(String),
}

/// Flat status code view of a [`StrandError`].
///
/// Useful for callers that report outcomes as codes rather than matching on the
/// full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Status {
    /// The operation completed.
    Ok,
    /// Allocation failure.
    AllocationFailed,
    /// Short or failed read.
    InvalidRead,
    /// Chunk length sentinel or cap.
    InvalidLength,
    /// Header signature or markers rejected.
    InvalidHeader,
    /// Duplicate key in a unique table.
    InsertConflict,
    /// Nothing to link.
    LinkFailure,
    /// Anything else.
    Failed,
}

impl StrandError {
    /// Maps the error to its flat [`Status`] code.
    pub fn status(&self) -> Status {
        match self {
            Self::Allocation(_) => Status::AllocationFailed,
            Self::Io(_) | Self::InvalidRead(_) => Status::InvalidRead,
            Self::InvalidChunkLength { .. } => Status::InvalidLength,
            Self::InvalidHeader(_) => Status::InvalidHeader,
            Self::TableConflict(_) => Status::InsertConflict,
            Self::LinkFailure(_) => Status::LinkFailure,
            Self::Schema(_) | Self::Compression(_) | Self::Unsupported(_) | Self::Failed(_) => {
                Status::Failed
            }
        }
    }

    pub(crate) fn alloc(what: &str, len: usize) -> Self {
        Self::Allocation(format!("could not reserve {len} bytes for {what}"))
    }
}

impl fmt::Display for StrandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Allocation(s) => write!(f, "Allocation Error: {s}"),
            Self::InvalidRead(s) => write!(f, "Invalid Read: {s}"),
            Self::InvalidChunkLength { code, len } => {
                write!(f, "Invalid Chunk Length: chunk '{code}' declares {len:#x} bytes")
            }
            Self::InvalidHeader(s) => write!(f, "Invalid Header: {s}"),
            Self::TableConflict(s) => write!(f, "Table Conflict: {s}"),
            Self::LinkFailure(s) => write!(f, "Link Failure: {s}"),
            Self::Schema(s) => write!(f, "Schema Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Unsupported(s) => write!(f, "Unsupported: {s}"),
            Self::Failed(s) => write!(f, "Failed: {s}"),
        }
    }
}

impl std::error::Error for StrandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StrandError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
