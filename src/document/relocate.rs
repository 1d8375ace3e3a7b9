//! Transcription of chunk payloads into the current layout.
//!
//! Relocation runs in two passes over the scanned chunks:
//!
//! 1. every chunk of a linked struct type is rebuilt member by member from its
//!    [`StructLink`] plan; a `**` member converts the pointer-array block it refers to
//!    on first sight, so later references find it already relocated;
//! 2. opaque chunks that no `**` member claimed are copied verbatim.
//!
//! Pointers are written in the current pointer width and native byte order. Their value
//! is the old address when it resolves to a chunk and zero otherwise.

use serde::Serialize;

use super::address::AddressMap;
use super::chunk::{ChunkRecord, ChunkState};
use crate::config::DocumentConfig;
use crate::containers::BufferPool;
use crate::error::{Result, StrandError};
use crate::format::{Endian, OldAddr, PointerWidth};
use crate::link::{MatchKind, SchemaLink, StructLink};
use crate::report::{Report, ReportLevel};
use crate::schema::{Member, SchemaTable};

/// Counters gathered during relocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelocateStats {
    /// Chunks rebuilt from a linked struct.
    pub structs: usize,
    /// Opaque chunks copied verbatim.
    pub opaque: usize,
    /// Pointer-array blocks converted through a `**` member.
    pub pointer_arrays: usize,
    /// Chunks left as read because of configuration.
    pub skipped: usize,
    /// Chunks left as read because their type has no counterpart.
    pub unlinked: usize,
    /// Non-null pointers that did not resolve and were written as zero.
    pub unresolved_pointers: usize,
}

/// Rewrites chunks of one document against one link result.
pub(crate) struct Relocator<'a> {
    pub file: &'a SchemaTable,
    pub memory: &'a SchemaTable,
    pub link: &'a SchemaLink,
    pub addresses: &'a AddressMap,
    pub config: &'a DocumentConfig,
    pub report: &'a dyn Report,
    pub file_endian: Endian,
    pub stats: RelocateStats,
}

impl Relocator<'_> {
    fn swap(&self) -> bool {
        self.file_endian != Endian::native()
    }

    /// True if a relocated payload of `len` bytes stays within the configured cap.
    fn fits(&self, len: usize) -> bool {
        u32::try_from(len).is_ok_and(|len| len <= self.config.max_chunk_len)
    }

    /// Memory struct index recorded on opaque chunks.
    fn opaque_type(&self) -> Option<u32> {
        self.memory
            .find_struct(&self.config.sentinel_type)
            .map(|i| i as u32)
    }

    /// Relocates every raw chunk, then hands the raw buffers of relocated chunks back
    /// to `pool`.
    pub fn run(&mut self, chunks: &mut [ChunkRecord], pool: &mut BufferPool) -> Result<()> {
        let (file, link, config) = (self.file, self.link, self.config);
        for index in 0..chunks.len() {
            if chunks[index].state != ChunkState::Raw {
                continue;
            }
            let chunk = &chunks[index];
            if config.skip_codes.contains(&chunk.code()) {
                chunks[index].state = ChunkState::Skipped;
                self.stats.skipped += 1;
                continue;
            }

            let type_index = chunk.file_type() as usize;
            let Some(name) = file.struct_name(type_index) else {
                self.report.report(
                    ReportLevel::Debug,
                    &format!(
                        "chunk {} at {}: struct index {type_index} out of range",
                        chunk.code(),
                        chunk.old()
                    ),
                );
                chunks[index].state = ChunkState::Unlinked;
                self.stats.unlinked += 1;
                continue;
            };
            if config.skip_types.iter().any(|t| t == name) {
                chunks[index].state = ChunkState::Skipped;
                self.stats.skipped += 1;
                continue;
            }

            match link.structure(type_index) {
                Some(StructLink::Linked { memory, .. }) => {
                    self.relocate_struct(index, type_index, *memory, chunks, pool)?;
                    self.stats.structs += 1;
                }
                Some(StructLink::Opaque) => {}
                Some(StructLink::Unlinked) | None => {
                    self.report.report(
                        ReportLevel::Debug,
                        &format!("chunk {} at {}: '{name}' is unlinked", chunk.code(), chunk.old()),
                    );
                    chunks[index].state = ChunkState::Unlinked;
                    self.stats.unlinked += 1;
                }
            }
        }

        let opaque_type = self.opaque_type();
        for chunk in chunks.iter_mut() {
            if chunk.state != ChunkState::Raw {
                continue;
            }
            let raw = chunk.raw.as_deref().unwrap_or_default();
            let mut out = pool.take(raw.len())?;
            out.copy_from_slice(raw);
            chunk.set_relocated(out, opaque_type);
            self.stats.opaque += 1;
        }

        for chunk in chunks.iter_mut() {
            if chunk.state == ChunkState::Relocated
                && let Some(raw) = chunk.raw.take()
            {
                pool.give(raw);
            }
        }
        Ok(())
    }

    fn relocate_struct(
        &mut self,
        index: usize,
        file_index: usize,
        memory_index: usize,
        chunks: &mut [ChunkRecord],
        pool: &mut BufferPool,
    ) -> Result<()> {
        let (file, memory, link) = (self.file, self.memory, self.link);
        let Some(StructLink::Linked { members, .. }) = link.structure(file_index) else {
            return Err(StrandError::Failed(format!("struct {file_index} is not linked")));
        };
        let file_struct = &file.structs()[file_index];
        let memory_struct = &memory.structs()[memory_index];

        let header = chunks[index].header;
        let count = header.count as usize;
        let old_size = file_struct.length;
        let new_size = memory_struct.length;

        let Some(raw) = chunks[index].raw.take() else {
            return Err(StrandError::Failed(format!(
                "chunk {} at {} has no payload",
                header.code, header.old
            )));
        };
        let needed = count.checked_mul(old_size).unwrap_or(usize::MAX);
        if raw.len() < needed {
            chunks[index].raw = Some(raw);
            return Err(StrandError::InvalidRead(format!(
                "chunk {} at {}: {} bytes cannot hold {count} x {old_size}",
                header.code,
                header.old,
                header.len
            )));
        }

        let out_len = match count.checked_mul(new_size) {
            Some(len) if self.fits(len) => len,
            _ => {
                chunks[index].raw = Some(raw);
                return Err(StrandError::InvalidChunkLength {
                    code: header.code.to_string(),
                    len: u32::try_from(count.saturating_mul(new_size)).unwrap_or(u32::MAX),
                });
            }
        };
        let mut out = match pool.take(out_len) {
            Ok(out) => out,
            Err(e) => {
                chunks[index].raw = Some(raw);
                return Err(e);
            }
        };

        // Both layouts empty: there is nothing to transcribe however many elements.
        let elements = if old_size == 0 && new_size == 0 { 0 } else { count };
        for element in 0..elements {
            let src = &raw[element * old_size..(element + 1) * old_size];
            let dst = &mut out[element * new_size..(element + 1) * new_size];
            for (target, plan) in memory_struct.members.iter().zip(members) {
                let (Some(source), Some(kind)) = (plan.source, plan.kind) else {
                    continue;
                };
                let source = &file_struct.members[source];
                let (Some(from), Some(to)) = (
                    src.get(source.offset..source.offset + source.length),
                    dst.get_mut(target.offset..target.offset + target.length),
                ) else {
                    continue;
                };
                self.transcribe(source, target, kind, from, to, chunks, pool)?;
            }
        }

        chunks[index].raw = Some(raw);
        chunks[index].set_relocated(out, Some(memory_index as u32));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn transcribe(
        &mut self,
        source: &Member,
        target: &Member,
        kind: MatchKind,
        from: &[u8],
        to: &mut [u8],
        chunks: &mut [ChunkRecord],
        pool: &mut BufferPool,
    ) -> Result<()> {
        let elements = source.array_size.min(target.array_size) as usize;
        match kind {
            MatchKind::Pointer => {
                let fw = self.file.pointer_width().bytes();
                let mw = self.memory.pointer_width().bytes();
                let pairs = from.chunks_exact(fw).zip(to.chunks_exact_mut(mw));
                for (src, dst) in pairs.take(elements) {
                    let value = if source.is_function_pointer {
                        0
                    } else {
                        let old = read_pointer(src, self.file.pointer_width(), self.file_endian);
                        if source.pointer_depth >= 2 {
                            self.convert_pointer_array(old, chunks, pool)?;
                        }
                        self.resolve(old)
                    };
                    write_pointer(dst, self.memory.pointer_width(), value);
                }
            }
            MatchKind::Exact => {
                let from_width = source.length / source.array_size.max(1) as usize;
                let to_width = target.length / target.array_size.max(1) as usize;
                let width = from_width.min(to_width);
                if width == 0 {
                    return Ok(());
                }
                let reverse = self.swap()
                    && from_width == to_width
                    && self
                        .file
                        .member_primitive(source)
                        .is_some_and(|p| p.width() == width && width > 1);
                let pairs = from.chunks_exact(from_width).zip(to.chunks_exact_mut(to_width));
                for (src, dst) in pairs.take(elements) {
                    dst[..width].copy_from_slice(&src[..width]);
                    if reverse {
                        dst[..width].reverse();
                    }
                }
            }
            MatchKind::Integer | MatchKind::Cast => {
                let (Some(src), Some(dst)) = (
                    self.file.member_primitive(source),
                    self.memory.member_primitive(target),
                ) else {
                    return Ok(());
                };
                let pairs = from.chunks_exact(src.width()).zip(to.chunks_exact_mut(dst.width()));
                for (bytes, out) in pairs.take(elements) {
                    dst.write(src.read(bytes, self.swap()), out);
                }
            }
        }
        Ok(())
    }

    /// Converts the pointer-array block at `old` in place, once.
    fn convert_pointer_array(
        &mut self,
        old: OldAddr,
        chunks: &mut [ChunkRecord],
        pool: &mut BufferPool,
    ) -> Result<()> {
        let Some(index) = self.addresses.get(old) else {
            return Ok(());
        };
        if chunks[index].state != ChunkState::Raw {
            return Ok(());
        }
        let type_index = chunks[index].file_type() as usize;
        if !matches!(self.link.structure(type_index), Some(StructLink::Opaque)) {
            return Ok(());
        }
        let Some(raw) = chunks[index].raw.take() else {
            return Ok(());
        };

        let fw = self.file.pointer_width();
        let mw = self.memory.pointer_width();
        let entries = raw.len() / fw.bytes();
        let out_len = entries.saturating_mul(mw.bytes());
        if !self.fits(out_len) {
            let code = chunks[index].code().to_string();
            chunks[index].raw = Some(raw);
            return Err(StrandError::InvalidChunkLength {
                code,
                len: u32::try_from(out_len).unwrap_or(u32::MAX),
            });
        }
        let mut out = match pool.take(out_len) {
            Ok(out) => out,
            Err(e) => {
                chunks[index].raw = Some(raw);
                return Err(e);
            }
        };
        for j in 0..entries {
            let entry = read_pointer(&raw[j * fw.bytes()..], fw, self.file_endian);
            let value = self.resolve(entry);
            write_pointer(&mut out[j * mw.bytes()..], mw, value);
        }

        let opaque_type = self.opaque_type();
        let chunk = &mut chunks[index];
        chunk.raw = Some(raw);
        chunk.set_relocated(out, opaque_type);
        self.stats.pointer_arrays += 1;
        Ok(())
    }

    /// The value a relocated pointer to `old` carries.
    fn resolve(&mut self, old: OldAddr) -> u64 {
        if old.is_null() {
            return 0;
        }
        if !self.addresses.contains(old) {
            self.stats.unresolved_pointers += 1;
            return 0;
        }
        if self.memory.pointer_width() == PointerWidth::Four && old.0 > u64::from(u32::MAX) {
            self.report.report(
                ReportLevel::Warning,
                &format!("address {old} does not fit a 32-bit pointer"),
            );
            self.stats.unresolved_pointers += 1;
            return 0;
        }
        old.0
    }
}

fn read_pointer(bytes: &[u8], width: PointerWidth, endian: Endian) -> OldAddr {
    match width {
        PointerWidth::Four => OldAddr(u64::from(endian.read_u32(bytes))),
        PointerWidth::Eight => OldAddr(endian.read_u64(bytes)),
    }
}

fn write_pointer(out: &mut [u8], width: PointerWidth, value: u64) {
    match width {
        PointerWidth::Four => out[..4].copy_from_slice(&(value as u32).to_ne_bytes()),
        PointerWidth::Eight => out[..8].copy_from_slice(&value.to_ne_bytes()),
    }
}
