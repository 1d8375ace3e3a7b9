// src/inspector.rs

//! Tools for inspecting parsed Strand documents.
//! Useful for checking how an old document mapped onto the current schema.

use std::path::Path;

use serde::Serialize;

use crate::config::ParseMode;
use crate::document::{ChunkState, Document, RelocateStats};
use crate::error::Result;
use crate::link::{LinkStats, StructLink};
use crate::schema::{CurrentSchema, MemberFlags};

/// A structural report of a parsed document.
#[derive(Debug, Serialize)]
pub struct DebugReport {
    /// Header text, e.g. `STRAND!-v300`.
    pub header: String,
    /// Format version.
    pub version: u16,
    /// Whether the header used the stripped signature.
    pub stripped: bool,
    /// Structs in the file schema.
    pub file_structs: usize,
    /// Structs in the current schema.
    pub memory_structs: usize,
    /// Link counters.
    pub link: Option<LinkStats>,
    /// Relocation counters.
    pub relocation: RelocateStats,
    /// Chunks dropped for reusing an address.
    pub duplicates: usize,
    /// Chunks grouped by code.
    pub groups: Vec<CodeGroup>,
    /// Notes on schema drift.
    pub drift: Vec<StructDrift>,
}

/// All chunks sharing one code.
#[derive(Debug, Serialize)]
pub struct CodeGroup {
    /// Chunk code.
    pub code: String,
    /// Chunks in document order.
    pub chunks: Vec<ChunkInfo>,
}

/// Metadata for a single chunk.
#[derive(Debug, Serialize)]
pub struct ChunkInfo {
    /// Old address.
    pub old: u64,
    /// Payload length as read.
    pub len: u32,
    /// Payload length after relocation.
    pub relocated_len: Option<usize>,
    /// Struct type name in the file schema.
    pub type_name: String,
    /// Number of struct instances.
    pub count: u32,
    /// Lifecycle state.
    pub state: ChunkState,
}

/// How one linked struct differs between the two schemas.
#[derive(Debug, Serialize)]
pub struct StructDrift {
    /// Struct type name.
    pub name: String,
    /// The file struct's members do not cover its declared length.
    pub misaligned: bool,
    /// Current members with no file counterpart.
    pub missing: Vec<String>,
    /// Current members converted by value.
    pub cast: Vec<String>,
}

/// The Strand Inspector tool.
#[derive(Debug)]
pub struct DocumentInspector;

impl DocumentInspector {
    /// Parses the file at `path` into memory and reports on it.
    pub fn inspect_path<P: AsRef<Path>>(path: P, current: &CurrentSchema) -> Result<DebugReport> {
        let mut doc = Document::new(current)?;
        doc.parse_file(path, ParseMode::ReadToMemory)?;
        Ok(Self::inspect(&doc))
    }

    /// Reports on an already parsed document.
    pub fn inspect(doc: &Document) -> DebugReport {
        let file = doc.file_schema();
        let memory = doc.memory_schema();
        let type_name = |index: u32| {
            file.and_then(|f| f.struct_name(index as usize))
                .map_or_else(|| format!("#{index}"), str::to_string)
        };

        let mut groups: Vec<CodeGroup> = Vec::new();
        for chunk in doc.chunks() {
            let code = chunk.code().to_string();
            let info = ChunkInfo {
                old: chunk.old().0,
                len: chunk.header().len,
                relocated_len: chunk.relocated().map(<[u8]>::len),
                type_name: type_name(chunk.file_type()),
                count: chunk.count(),
                state: chunk.state(),
            };
            match groups.iter_mut().find(|g| g.code == code) {
                Some(group) => group.chunks.push(info),
                None => groups.push(CodeGroup {
                    code,
                    chunks: vec![info],
                }),
            }
        }

        let mut drift = Vec::new();
        if let (Some(file), Some(link)) = (file, doc.link()) {
            for (index, plan) in link.structs().iter().enumerate() {
                let StructLink::Linked { memory: target, members } = plan else {
                    continue;
                };
                let target_struct = &memory.structs()[*target];
                let mut entry = StructDrift {
                    name: file.struct_name(index).unwrap_or_default().to_string(),
                    misaligned: file.structs()[index].is_misaligned(),
                    missing: Vec::new(),
                    cast: Vec::new(),
                };
                for (member, plan) in target_struct.members.iter().zip(members) {
                    let name = memory.member_name(member).text.clone();
                    if plan.flags.contains(MemberFlags::MISSING) {
                        entry.missing.push(name);
                    } else if plan.flags.contains(MemberFlags::NEEDS_CAST) {
                        entry.cast.push(name);
                    }
                }
                if entry.misaligned || !entry.missing.is_empty() || !entry.cast.is_empty() {
                    drift.push(entry);
                }
            }
        }

        let header = doc.header();
        DebugReport {
            header: doc.header_string().unwrap_or_default(),
            version: header.map_or(0, |h| h.version),
            stripped: header.is_some_and(|h| h.stripped),
            file_structs: file.map_or(0, |f| f.structs().len()),
            memory_structs: memory.structs().len(),
            link: doc.link().map(|l| l.stats()),
            relocation: doc.relocate_stats(),
            duplicates: doc.duplicates(),
            groups,
            drift,
        }
    }
}

impl std::fmt::Display for DebugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== STRAND INSPECTOR REPORT ===")?;
        writeln!(f, "Header:         {}", self.header)?;
        writeln!(
            f,
            "Structs:        {} file / {} current",
            self.file_structs, self.memory_structs
        )?;
        if let Some(link) = &self.link {
            writeln!(
                f,
                "Members:        {} exact, {} pointer, {} integer, {} cast, {} missing",
                link.exact, link.pointer, link.integer, link.cast, link.missing
            )?;
        }
        writeln!(f, "Duplicates:     {}", self.duplicates)?;

        writeln!(f, "\n[CHUNKS]")?;
        for (i, group) in self.groups.iter().enumerate() {
            group.fmt_tree(f, i == self.groups.len() - 1)?;
        }

        if !self.drift.is_empty() {
            writeln!(f, "\n[DRIFT]")?;
            for entry in &self.drift {
                let misaligned = if entry.misaligned { " (misaligned)" } else { "" };
                writeln!(f, "{}{misaligned}", entry.name)?;
                for name in &entry.missing {
                    writeln!(f, "    - {name} missing")?;
                }
                for name in &entry.cast {
                    writeln!(f, "    ~ {name} cast")?;
                }
            }
        }
        Ok(())
    }
}

impl CodeGroup {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>, is_last: bool) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        writeln!(f, "{connector}[{}] {} chunks", self.code, self.chunks.len())?;

        for (i, chunk) in self.chunks.iter().enumerate() {
            let connector = if i == self.chunks.len() - 1 { "└── " } else { "├── " };
            let relocated = chunk
                .relocated_len
                .map(|n| format!(" -> {n}b"))
                .unwrap_or_default();
            writeln!(
                f,
                "{child_prefix}{connector}{:#x} {} x{} | {}b{relocated} | {:?}",
                chunk.old, chunk.type_name, chunk.count, chunk.len, chunk.state
            )?;
        }
        Ok(())
    }
}
