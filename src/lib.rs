//! # Strand
//!
//! A codec for self-describing binary documents: chunked files that carry a description
//! of their own struct layouts, read back into the layout the current program expects.
//!
//! ## Overview
//!
//! A program that snapshots its in-memory structs straight to disk gets fast saves, and a
//! migration problem: the next version of the program has renamed, resized, retyped,
//! added or removed fields, and may run with a different pointer width or byte order.
//! Strand solves this without a hand-written migration per version. Every document embeds
//! the schema it was written with; on load, that schema is linked field by field against
//! the program's current schema and every record is transcribed into the new layout.
//!
//! ### Key Features
//!
//! *   **Schema Linking:** Fields are matched by name, nesting and type. Same-typed fields
//!     are copied, integers of different widths are extended or truncated, other numeric
//!     pairs are converted by value, and new fields are zero-filled.
//! *   **Pointer Relocation:** Pointers are stored as opaque old addresses and resolved
//!     through an address map, never dereferenced. Arrays of pointers are converted once
//!     and shared by every reference.
//! *   **Portable Layouts:** 32- and 64-bit documents, little- and big-endian, in either
//!     direction.
//! *   **Framing:** Plain files, gzip, zstd and in-memory buffers, with detection and
//!     fallback between codecs.
//! *   **Round Trip:** A loaded document can be written back out in the current layout.
//!
//! ## Architecture
//!
//! ### File Format
//!
//! ```text
//! [Header] [Chunk] [Chunk] ... [DNA1 Chunk] [ENDB Chunk]
//! ```
//!
//! See [`format`] for the byte-level layout.
//!
//! ### Pipeline
//!
//! ```text
//! stream -> chunk scanner -> schema chunk -> compiler -> linker -> relocator -> records
//! ```
//!
//! *   [`io`] reads bytes from a file, a gzip stream or memory.
//! *   [`schema`] compiles descriptor blobs into [`schema::SchemaTable`]s.
//! *   [`link`] matches the document's schema against the current one.
//! *   [`document`] scans chunks, relocates them and writes them back.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strand::{CurrentSchema, SaveMode, SchemaBuilder, Strand};
//! use strand::format::PointerWidth;
//!
//! let schema = SchemaBuilder::new(PointerWidth::native())
//!     .with_primitives()
//!     .structure("Point", &[("int", "x"), ("int", "y"), ("int", "z")])
//!     .build()?;
//!
//! let current = CurrentSchema::new(schema);
//! let doc = Strand::open("scene.bin", &current)?;
//! for chunk in doc.records(strand::format::ChunkCode::DATA) {
//!     println!("{} x{} at {}", chunk.code(), chunk.count(), chunk.old());
//! }
//! Strand::upgrade("scene.bin", "scene.new.bin", &current, SaveMode::Uncompressed)?;
//! # Ok::<(), strand::StrandError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** `unsafe` is used once, to memory-map a file in
//!   [`ParseMode::ReadToMemory`].
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`StrandError`] type.
//! * **Fail Fast:** The first error aborts a parse and resets the document.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod compression;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
pub mod inspector;
pub mod link;
pub mod report;
pub mod schema;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod containers;
#[doc(hidden)]
pub mod hash;
pub mod io;

// --- RE-EXPORTS ---

pub use compression::{Compressor, CompressorRegistry};
pub use config::{DocumentConfig, DuplicatePolicy, ParseMode, SaveMode};

pub use api::Strand;
pub use document::{ChunkRecord, ChunkState, Document, ParseState};
pub use error::{Result, Status, StrandError};
pub use inspector::DocumentInspector;
pub use report::{CollectReport, LogReport, NullReport, Report, ReportLevel};
pub use schema::{CurrentSchema, SchemaBuilder, SchemaProvider, SchemaTable};

/// Constants used throughout the library.
pub mod constants {
    /// The default buffer size for I/O operations.
    pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
}
