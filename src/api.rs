use std::path::Path;
use std::sync::Arc;

use crate::config::{DocumentConfig, ParseMode, SaveMode};
use crate::document::Document;
use crate::error::Result;
use crate::report::Report;
use crate::schema::CurrentSchema;

/// The main entry point for loading and re-saving documents.
#[derive(Debug)]
pub struct Strand;

impl Strand {
    /// Opens the document at `path`, guessing its framing from the first bytes, and
    /// relocates it into `current`.
    pub fn open<P: AsRef<Path>>(path: P, current: &CurrentSchema) -> Result<Document> {
        Self::open_with(path, current, DocumentConfig::default(), None)
    }

    /// Like [`Strand::open`] with an explicit configuration and report sink.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        current: &CurrentSchema,
        config: DocumentConfig,
        report: Option<Arc<dyn Report>>,
    ) -> Result<Document> {
        let mut doc = Document::new(current)?.with_config(config);
        if let Some(report) = report {
            doc = doc.with_report(report);
        }
        doc.parse_path(path, true)?;
        Ok(doc)
    }

    /// Parses a document held in memory, detecting compression from its prefix.
    pub fn from_bytes(bytes: &[u8], current: &CurrentSchema) -> Result<Document> {
        let mut doc = Document::new(current)?;
        doc.parse_bytes(bytes, ParseMode::ReadToMemory, false)?;
        Ok(doc)
    }

    /// Loads `src` and writes it to `dst` in the current layout.
    pub fn upgrade<P: AsRef<Path>, Q: AsRef<Path>>(
        src: P,
        dst: Q,
        current: &CurrentSchema,
        mode: SaveMode,
    ) -> Result<()> {
        let mut doc = Self::open(src, current)?;
        doc.save(dst, mode)
    }
}
