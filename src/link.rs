//! Cross-schema linking.
//!
//! Every file struct is matched to the memory struct with the same type name, and every
//! member of a matched memory struct to the file member it should be read from. The
//! result is a [`SchemaLink`]: one [`StructLink`] per file struct, each carrying one
//! [`MemberLink`] per memory member, in memory layout order. The relocator walks these
//! plans and never looks at names again.
//!
//! ## Member matching
//!
//! Candidates must share the bare name hash, the nesting depth and the whole key chain.
//! Among them the best-ranked match wins:
//!
//! 1. same type and width: [`MatchKind::Exact`], or [`MatchKind::Pointer`] when both sides are
//!    pointers of the same depth (pointers never match anything else);
//! 2. both integer types: [`MatchKind::Integer`];
//! 3. both numeric types: [`MatchKind::Cast`], flagged `NEEDS_CAST`.
//!
//! A memory member with no candidate is flagged `MISSING` and stays zero.

use serde::Serialize;

use crate::containers::HashTable;
use crate::error::{Result, StrandError};
use crate::report::{Report, ReportLevel};
use crate::schema::{Member, MemberFlags, SchemaTable};

/// How a memory member is produced from its file counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MatchKind {
    /// Same type: bytes are copied.
    Exact,
    /// Same pointer type: each address is resolved through the address map.
    Pointer,
    /// Both integers of different types: sign or zero extension, or truncation.
    Integer,
    /// Both numeric, at least one a float: value conversion.
    Cast,
}

impl MatchKind {
    fn rank(self) -> u8 {
        match self {
            Self::Exact | Self::Pointer => 0,
            Self::Integer => 1,
            Self::Cast => 2,
        }
    }
}

/// The source of one memory member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberLink {
    /// Index of the file member read from; `None` when missing.
    pub source: Option<usize>,
    /// Match kind; `None` when missing.
    pub kind: Option<MatchKind>,
    /// `MISSING` or `NEEDS_CAST`.
    pub flags: MemberFlags,
}

impl MemberLink {
    const MISSING: Self = Self {
        source: None,
        kind: None,
        flags: MemberFlags::MISSING,
    };
}

/// The plan for one file struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructLink {
    /// No memory struct of the same name; chunks of this type are not relocated.
    Unlinked,
    /// The opaque-blob sentinel type; chunks are copied byte for byte.
    Opaque,
    /// Matched to a memory struct.
    Linked {
        /// Index of the memory struct.
        memory: usize,
        /// One entry per memory member.
        members: Vec<MemberLink>,
    },
}

/// Counters gathered while linking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// File structs with a memory counterpart.
    pub linked_structs: usize,
    /// File structs without one.
    pub unlinked_structs: usize,
    /// Memory members matched by type.
    pub exact: usize,
    /// Memory pointer members matched.
    pub pointer: usize,
    /// Memory members matched across integer widths.
    pub integer: usize,
    /// Memory members needing a numeric cast.
    pub cast: usize,
    /// Memory members left zero.
    pub missing: usize,
}

/// Result of linking a file schema against a memory schema.
#[derive(Debug, Clone)]
pub struct SchemaLink {
    structs: Vec<StructLink>,
    stats: LinkStats,
}

impl SchemaLink {
    /// The plan for file struct `index`.
    pub fn structure(&self, index: usize) -> Option<&StructLink> {
        self.structs.get(index)
    }

    /// Plans for every file struct, indexed like the file schema.
    pub fn structs(&self) -> &[StructLink] {
        &self.structs
    }

    /// Counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Memory struct linked to file struct `index`.
    pub fn memory_struct(&self, index: usize) -> Option<usize> {
        match self.structs.get(index)? {
            StructLink::Linked { memory, .. } => Some(*memory),
            _ => None,
        }
    }
}

/// Links `file` against `memory`.
///
/// Struct and member `link` fields of `file` are updated to point into `memory`; file
/// members nothing reads from are flagged `MISSING`. Structs named `sentinel` become
/// [`StructLink::Opaque`].
///
/// # Errors
/// [`StrandError::LinkFailure`] if either schema has no structs.
pub fn link(
    file: &mut SchemaTable,
    memory: &SchemaTable,
    sentinel: &str,
    report: &dyn Report,
) -> Result<SchemaLink> {
    if file.structs().is_empty() {
        return Err(StrandError::LinkFailure("file schema has no structs".into()));
    }
    if memory.structs().is_empty() {
        return Err(StrandError::LinkFailure("current schema has no structs".into()));
    }

    for index in file.misaligned().collect::<Vec<_>>() {
        let s = &file.structs()[index];
        report.report(
            ReportLevel::Warning,
            &format!(
                "struct '{}' is misaligned: members cover {} of {} bytes",
                file.struct_name(index).unwrap_or("?"),
                s.computed_length,
                s.length
            ),
        );
    }

    let mut stats = LinkStats::default();
    let mut plans = Vec::with_capacity(file.structs().len());

    for index in 0..file.structs().len() {
        let name = file.struct_name(index).unwrap_or_default().to_string();
        if name == sentinel {
            plans.push(StructLink::Opaque);
            continue;
        }
        let Some(target) = memory.find_struct(&name) else {
            stats.unlinked_structs += 1;
            report.report(ReportLevel::Debug, &format!("struct '{name}' has no counterpart"));
            plans.push(StructLink::Unlinked);
            continue;
        };
        stats.linked_structs += 1;

        let members = link_members(file, index, memory, target, &name, report, &mut stats);
        plans.push(StructLink::Linked {
            memory: target,
            members,
        });
    }

    report.report(
        ReportLevel::Info,
        &format!(
            "linked {} structs ({} unlinked): \
             {} exact, {} pointer, {} integer, {} cast, {} missing",
            stats.linked_structs,
            stats.unlinked_structs,
            stats.exact,
            stats.pointer,
            stats.integer,
            stats.cast,
            stats.missing
        ),
    );

    Ok(SchemaLink {
        structs: plans,
        stats,
    })
}

fn link_members(
    file: &mut SchemaTable,
    file_index: usize,
    memory: &SchemaTable,
    memory_index: usize,
    struct_name: &str,
    report: &dyn Report,
    stats: &mut LinkStats,
) -> Vec<MemberLink> {
    let file_struct = &file.structs()[file_index];
    let memory_struct = &memory.structs()[memory_index];

    // Bare name hash -> file members carrying it.
    let mut by_name: HashTable<u64, Vec<usize>> =
        HashTable::with_capacity(file_struct.members.len());
    for (i, m) in file_struct.members.iter().enumerate() {
        match by_name.find_mut(&m.name_hash) {
            Some(list) => list.push(i),
            None => {
                by_name.insert(m.name_hash, vec![i]);
            }
        }
    }

    let mut plan = Vec::with_capacity(memory_struct.members.len());
    for target in &memory_struct.members {
        let mut best: Option<(usize, MatchKind)> = None;
        for &candidate in by_name.find(&target.name_hash).map(Vec::as_slice).unwrap_or(&[]) {
            let source = &file_struct.members[candidate];
            let Some(kind) = classify(file, source, memory, target) else {
                continue;
            };
            if best.is_none_or(|(_, b)| kind.rank() < b.rank()) {
                best = Some((candidate, kind));
            }
        }

        let link = match best {
            Some((source, kind)) => {
                let mut flags = MemberFlags::EMPTY;
                match kind {
                    MatchKind::Exact => stats.exact += 1,
                    MatchKind::Pointer => stats.pointer += 1,
                    MatchKind::Integer => stats.integer += 1,
                    MatchKind::Cast => {
                        stats.cast += 1;
                        flags.insert(MemberFlags::NEEDS_CAST);
                        report.report(
                            ReportLevel::Debug,
                            &format!(
                                "{struct_name}.{} needs a cast",
                                memory.member_name(target).base
                            ),
                        );
                    }
                }
                MemberLink {
                    source: Some(source),
                    kind: Some(kind),
                    flags,
                }
            }
            None => {
                stats.missing += 1;
                report.report(
                    ReportLevel::Debug,
                    &format!("{struct_name}.{} is missing", memory.member_name(target).base),
                );
                MemberLink::MISSING
            }
        };
        plan.push(link);
    }

    // Record the correspondence on the file side.
    let descriptor = &mut file.structs_mut()[file_index];
    descriptor.link = Some(memory_index);
    for member in &mut descriptor.members {
        member.link = None;
        member.flags.remove(MemberFlags::NEEDS_CAST);
        member.flags.insert(MemberFlags::MISSING);
    }
    for (target, link) in plan.iter().enumerate() {
        if let Some(source) = link.source {
            let member = &mut descriptor.members[source];
            member.link = Some(target);
            member.flags.remove(MemberFlags::MISSING);
            if link.flags.contains(MemberFlags::NEEDS_CAST) {
                member.flags.insert(MemberFlags::NEEDS_CAST);
            }
        }
    }

    plan
}

/// Classifies a candidate pair that already shares the bare name.
fn classify(
    file: &SchemaTable,
    source: &Member,
    memory: &SchemaTable,
    target: &Member,
) -> Option<MatchKind> {
    if source.depth != target.depth || source.key_chain != target.key_chain {
        return None;
    }

    if source.is_pointer() || target.is_pointer() {
        let same = source.pointer_depth == target.pointer_depth
            && source.is_function_pointer == target.is_function_pointer
            && source.type_hash == target.type_hash;
        return same.then_some(MatchKind::Pointer);
    }

    let from = file.member_primitive(source);
    let to = memory.member_primitive(target);
    if source.type_hash == target.type_hash {
        // Same name, different width (`long` across data models) needs a conversion.
        let resized = matches!((from, to), (Some(f), Some(t)) if f.width() != t.width());
        if !resized {
            return Some(MatchKind::Exact);
        }
    }

    let (from, to) = (from?, to?);
    if from.is_integer() && to.is_integer() {
        Some(MatchKind::Integer)
    } else {
        Some(MatchKind::Cast)
    }
}
