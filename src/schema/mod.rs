//! Schema descriptors: parsing a descriptor blob into indexed struct layouts.
//!
//! A document embeds the schema it was written with (the *file* schema). The program
//! reading it supplies its own (the *memory* schema) through [`CurrentSchema`], which
//! compiles the blob once and shares the result for the life of the process.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Result, StrandError};
use crate::format::{Endian, PointerWidth};

/// Programmatic construction of descriptor blobs.
pub mod builder;
/// Field declaration parsing.
pub mod names;
/// Numeric primitive classification and conversion.
pub mod primitive;
/// The compiled schema table.
pub mod table;

pub use builder::SchemaBuilder;
pub use names::NameEntry;
pub use primitive::{NumericClass, Primitive, Value};
pub use table::{
    ChainLink, Member, MemberFlags, MemberKey, SchemaTable, StructDescriptor, TypeEntry,
};

/// Supplies the descriptor blob of the program's own data model.
pub trait SchemaProvider: Send + Sync {
    /// Returns the descriptor blob, in native byte order.
    fn initialize_tables(&self) -> Result<Cow<'static, [u8]>>;
}

enum Source {
    Blob(Cow<'static, [u8]>),
    Provider(Box<dyn SchemaProvider>),
}

/// The memory schema: compiled on first use, then shared read-only.
pub struct CurrentSchema {
    source: Source,
    pointer_width: PointerWidth,
    compiled: OnceLock<Arc<SchemaTable>>,
}

impl CurrentSchema {
    /// A schema compiled from `blob`, laid out for the host pointer width.
    pub fn new(blob: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            source: Source::Blob(blob.into()),
            pointer_width: PointerWidth::native(),
            compiled: OnceLock::new(),
        }
    }

    /// A schema whose blob is fetched from `provider` on first use.
    pub fn from_provider(provider: impl SchemaProvider + 'static) -> Self {
        Self {
            source: Source::Provider(Box::new(provider)),
            pointer_width: PointerWidth::native(),
            compiled: OnceLock::new(),
        }
    }

    /// Lays pointers out `pointer_width` wide instead of the host width.
    ///
    /// Has no effect once the schema has been compiled.
    pub fn with_pointer_width(mut self, pointer_width: PointerWidth) -> Self {
        self.pointer_width = pointer_width;
        self
    }

    /// Pointer width of the memory layout.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// The compiled table, compiling it on the first call.
    ///
    /// # Errors
    /// Whatever [`SchemaTable::compile`] or the provider returns. A failed compile is
    /// retried on the next call.
    pub fn get(&self) -> Result<Arc<SchemaTable>> {
        if let Some(table) = self.compiled.get() {
            return Ok(Arc::clone(table));
        }

        let blob = match &self.source {
            Source::Blob(blob) => Cow::Borrowed(blob.as_ref()),
            Source::Provider(provider) => provider.initialize_tables()?,
        };
        if blob.is_empty() {
            return Err(StrandError::LinkFailure("current schema blob is empty".into()));
        }
        let table = Arc::new(SchemaTable::compile(&blob, self.pointer_width, Endian::native())?);
        log::debug!(
            "compiled current schema: {} structs, {} types",
            table.structs().len(),
            table.types().len()
        );

        // A racing caller may have stored its table first.
        let _ = self.compiled.set(Arc::clone(&table));
        Ok(self.compiled.get().cloned().unwrap_or(table))
    }
}

impl fmt::Debug for CurrentSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Blob(blob) => format!("blob({} bytes)", blob.len()),
            Source::Provider(_) => "provider".to_string(),
        };
        f.debug_struct("CurrentSchema")
            .field("source", &source)
            .field("pointer_width", &self.pointer_width)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}
