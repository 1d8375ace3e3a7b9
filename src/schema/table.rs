use serde::Serialize;

use super::names::NameEntry;
use super::primitive::Primitive;
use crate::containers::HashTable;
use crate::error::{Result, StrandError};
use crate::format::{Endian, PointerWidth};
use crate::hash::name_hash;

/// Cap on the name table.
pub const MAX_NAMES: usize = u16::MAX as usize;
/// Cap on the type table.
pub const MAX_TYPES: usize = u16::MAX as usize;
/// Cap on the struct table.
pub const MAX_STRUCTS: usize = u16::MAX as usize;
/// Cap on flattened members per struct.
pub const MAX_MEMBERS: usize = 4_096;
/// Cap on struct-in-struct nesting.
pub const MAX_NESTING: usize = 32;
/// Cap on nested struct elements expanded while flattening one struct.
pub const MAX_EXPANSIONS: usize = 1 << 16;

const TAG_SDNA: &[u8; 4] = b"SDNA";
const TAG_NAME: &[u8; 4] = b"NAME";
const TAG_TYPE: &[u8; 4] = b"TYPE";
const TAG_TLEN: &[u8; 4] = b"TLEN";
const TAG_STRC: &[u8; 4] = b"STRC";

/// Flags recorded on members and structs, stored in one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct MemberFlags(u8);

impl MemberFlags {
    /// No flags.
    pub const EMPTY: Self = Self(0);
    /// No counterpart in the other schema; zero-filled on output.
    pub const MISSING: Self = Self(0b0000_0001);
    /// Flattened member lengths do not add up to the declared struct length.
    pub const MISALIGNED: Self = Self(0b0000_0010);
    /// Matched numeric member that needs a value conversion.
    pub const NEEDS_CAST: Self = Self(0b0000_0100);

    /// True if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Raw byte representation.
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

/// One entry of the type table.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    /// Type name.
    pub name: String,
    /// FNV hash of the name.
    pub hash: u64,
    /// Length from the `TLEN` table.
    pub length: usize,
    /// Index of the struct describing this type, `None` for primitives and opaque types.
    pub struct_index: Option<usize>,
    /// Numeric classification, when the type is a known primitive.
    pub primitive: Option<Primitive>,
}

/// One level of nesting in a member's key chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainLink {
    /// Hash of the enclosing member's type.
    pub type_hash: u64,
    /// Hash of the enclosing member's bare name.
    pub name_hash: u64,
    /// Element of the enclosing array (0 for scalars).
    pub element: u32,
}

/// Composite identity of a member: its type and bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    /// Hash of the type name.
    pub type_hash: u64,
    /// Hash of the bare member name.
    pub name_hash: u64,
}

/// A flattened leaf member of a struct.
///
/// Nested struct members are expanded in place; their position is recorded in
/// `key_chain`, whose length always equals `depth`.
#[derive(Debug, Clone)]
pub struct Member {
    /// Index into the type table.
    pub type_index: usize,
    /// Index into the name table.
    pub name_index: usize,
    /// Hash of the type name.
    pub type_hash: u64,
    /// Hash of the bare member name.
    pub name_hash: u64,
    /// Pointer indirection count.
    pub pointer_depth: u8,
    /// Declared as a function pointer.
    pub is_function_pointer: bool,
    /// Element count of the declaration.
    pub array_size: u32,
    /// Nesting depth below the owning struct.
    pub depth: usize,
    /// Byte offset within the owning struct.
    pub offset: usize,
    /// Total byte length, all elements included.
    pub length: usize,
    /// Ancestors from the outermost nested member inwards.
    pub key_chain: Vec<ChainLink>,
    /// Link state flags.
    pub flags: MemberFlags,
    /// Index of the matched member in the counterpart struct.
    pub link: Option<usize>,
}

impl Member {
    /// Type and bare-name identity.
    pub fn key(&self) -> MemberKey {
        MemberKey {
            type_hash: self.type_hash,
            name_hash: self.name_hash,
        }
    }

    /// True for pointers and function pointers.
    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    /// Length of one array element.
    pub fn element_size(&self) -> usize {
        self.length / (self.array_size.max(1) as usize)
    }
}

/// A compiled struct.
#[derive(Debug, Clone)]
pub struct StructDescriptor {
    /// Index into the type table.
    pub type_index: usize,
    /// Flattened leaf members in layout order.
    pub members: Vec<Member>,
    /// Length declared in the `TLEN` table.
    pub length: usize,
    /// Sum of the flattened member lengths.
    pub computed_length: usize,
    /// `MISALIGNED` when the two lengths disagree.
    pub flags: MemberFlags,
    /// Index of the counterpart struct in the other schema.
    pub link: Option<usize>,
}

impl StructDescriptor {
    /// True if the member walk did not reproduce the declared length.
    pub fn is_misaligned(&self) -> bool {
        self.flags.contains(MemberFlags::MISALIGNED)
    }
}

struct RawStruct {
    type_index: usize,
    members: Vec<(usize, usize)>,
}

/// A compiled schema: name, type and struct tables plus a type-name lookup.
#[derive(Debug)]
pub struct SchemaTable {
    names: Vec<NameEntry>,
    types: Vec<TypeEntry>,
    structs: Vec<StructDescriptor>,
    type_lookup: HashTable<u64, usize>,
    pointer_width: PointerWidth,
    endian: Endian,
    blob: Vec<u8>,
}

struct BlobCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> BlobCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(StrandError::Schema(format!(
                "descriptor truncated at byte {} (wanted {n} more)",
                self.pos
            )));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn tag(&mut self, tag: &[u8; 4]) -> Result<()> {
        let at = self.pos;
        let found = self.take(4)?;
        if found != tag {
            return Err(StrandError::Schema(format!(
                "expected '{}' at byte {at}, found '{}'",
                String::from_utf8_lossy(tag),
                String::from_utf8_lossy(found)
            )));
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<usize> {
        let bytes = self.take(2)?;
        Ok(usize::from(self.endian.read_u16(bytes)))
    }

    fn u32(&mut self) -> Result<usize> {
        let bytes = self.take(4)?;
        Ok(self.endian.read_u32(bytes) as usize)
    }

    fn cstr(&mut self) -> Result<&'a str> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest.iter().position(|b| *b == 0).ok_or_else(|| {
            StrandError::Schema(format!("unterminated string at byte {}", self.pos))
        })?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|_| StrandError::Schema(format!("non-UTF-8 string at byte {}", self.pos)))?;
        self.pos += len + 1;
        Ok(text)
    }

    fn align4(&mut self) {
        self.pos = (self.pos + 3) & !3;
    }

    fn count(&mut self, what: &str, cap: usize) -> Result<usize> {
        let n = self.u32()?;
        if n > cap {
            return Err(StrandError::Schema(format!("{n} {what} exceed the cap of {cap}")));
        }
        Ok(n)
    }
}

fn index_check(index: usize, len: usize, what: &str) -> Result<usize> {
    if index >= len {
        return Err(StrandError::Schema(format!(
            "{what} index {index} out of range (table has {len})"
        )));
    }
    Ok(index)
}

impl SchemaTable {
    /// Compiles a descriptor blob whose integers are in `endian` order, laying pointers
    /// out `pointer_width` wide.
    ///
    /// # Errors
    /// [`StrandError::Schema`] for malformed or oversized tables,
    /// [`StrandError::TableConflict`] when two structs describe the same type.
    pub fn compile(blob: &[u8], pointer_width: PointerWidth, endian: Endian) -> Result<Self> {
        let mut cur = BlobCursor {
            data: blob,
            pos: 0,
            endian,
        };

        cur.tag(TAG_SDNA)?;
        cur.tag(TAG_NAME)?;
        let name_count = cur.count("names", MAX_NAMES)?;
        let mut names = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            names.push(NameEntry::parse(cur.cstr()?)?);
        }

        cur.align4();
        cur.tag(TAG_TYPE)?;
        let type_count = cur.count("types", MAX_TYPES)?;
        let mut type_names = Vec::with_capacity(type_count);
        for _ in 0..type_count {
            type_names.push(cur.cstr()?);
        }

        cur.align4();
        cur.tag(TAG_TLEN)?;
        let mut types = Vec::with_capacity(type_count);
        for name in type_names {
            let length = cur.u16()?;
            types.push(TypeEntry {
                name: name.to_string(),
                hash: name_hash(name),
                length,
                struct_index: None,
                primitive: Primitive::from_type(name, length),
            });
        }

        cur.align4();
        cur.tag(TAG_STRC)?;
        let struct_count = cur.count("structs", MAX_STRUCTS)?;
        let mut raws = Vec::with_capacity(struct_count);
        for _ in 0..struct_count {
            let type_index = index_check(cur.u16()?, type_count, "struct type")?;
            let member_count = cur.u16()?;
            let mut members = Vec::with_capacity(member_count);
            for _ in 0..member_count {
                let t = index_check(cur.u16()?, type_count, "member type")?;
                let n = index_check(cur.u16()?, name_count, "member name")?;
                members.push((t, n));
            }
            raws.push(RawStruct {
                type_index,
                members,
            });
        }

        let mut type_lookup = HashTable::with_capacity(struct_count);
        for (i, raw) in raws.iter().enumerate() {
            let entry = &mut types[raw.type_index];
            if entry.struct_index.is_some() {
                return Err(StrandError::TableConflict(format!(
                    "type '{}' is described by more than one struct",
                    entry.name
                )));
            }
            entry.struct_index = Some(i);
            entry.primitive = None;
            type_lookup.try_insert(entry.hash, i).map_err(|_| {
                StrandError::TableConflict(format!("type name '{}' hashes twice", entry.name))
            })?;
        }

        let mut table = Self {
            names,
            types,
            structs: Vec::with_capacity(struct_count),
            type_lookup,
            pointer_width,
            endian,
            blob: blob.to_vec(),
        };

        for (i, raw) in raws.iter().enumerate() {
            let mut members = Vec::new();
            let mut chain = Vec::new();
            let mut expansions = 0;
            let computed =
                table.flatten(&raws, i, 0, &mut chain, &mut expansions, &mut members)?;
            let length = table.types[raw.type_index].length;
            let mut flags = MemberFlags::EMPTY;
            if computed != length {
                flags.insert(MemberFlags::MISALIGNED);
            }
            table.structs.push(StructDescriptor {
                type_index: raw.type_index,
                members,
                length,
                computed_length: computed,
                flags,
                link: None,
            });
        }

        Ok(table)
    }

    /// Depth-first walk of one struct's declared members. Returns the bytes consumed.
    ///
    /// The nesting depth is the length of `chain`; `expansions` counts nested struct
    /// elements across the whole walk.
    fn flatten(
        &self,
        raws: &[RawStruct],
        struct_index: usize,
        base_offset: usize,
        chain: &mut Vec<ChainLink>,
        expansions: &mut usize,
        out: &mut Vec<Member>,
    ) -> Result<usize> {
        let owner = &self.types[raws[struct_index].type_index].name;
        let too_long = || StrandError::Schema(format!("struct '{owner}' is too long"));
        let depth = chain.len();
        let mut offset = base_offset;

        for &(t, n) in &raws[struct_index].members {
            let ty = &self.types[t];
            let name = &self.names[n];
            let array = name.array_size as usize;

            if !name.is_pointer()
                && let Some(nested) = ty.struct_index
            {
                if depth + 1 > MAX_NESTING {
                    return Err(StrandError::Schema(format!(
                        "'{}' nests deeper than {MAX_NESTING} levels",
                        ty.name
                    )));
                }
                for element in 0..name.array_size {
                    *expansions += 1;
                    if *expansions > MAX_EXPANSIONS {
                        return Err(StrandError::Schema(format!(
                            "struct '{owner}' expands more than {MAX_EXPANSIONS} nested elements"
                        )));
                    }
                    chain.push(ChainLink {
                        type_hash: ty.hash,
                        name_hash: name.base_hash,
                        element,
                    });
                    let consumed = self.flatten(raws, nested, offset, chain, expansions, out);
                    chain.pop();
                    offset = offset.checked_add(consumed?).ok_or_else(too_long)?;
                }
                continue;
            }

            let element = if name.is_pointer() {
                self.pointer_width.bytes()
            } else {
                ty.length
            };
            let length = element.checked_mul(array).ok_or_else(too_long)?;
            out.push(Member {
                type_index: t,
                name_index: n,
                type_hash: ty.hash,
                name_hash: name.base_hash,
                pointer_depth: name.pointer_depth,
                is_function_pointer: name.is_function_pointer,
                array_size: name.array_size,
                depth,
                offset,
                length,
                key_chain: chain.clone(),
                flags: MemberFlags::EMPTY,
                link: None,
            });
            if out.len() > MAX_MEMBERS {
                return Err(StrandError::Schema(format!(
                    "struct '{owner}' flattens to more than {MAX_MEMBERS} members"
                )));
            }
            offset = offset.checked_add(length).ok_or_else(too_long)?;
        }

        Ok(offset - base_offset)
    }

    /// Pointer width this schema was compiled for.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// Byte order of the descriptor blob.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The descriptor blob this table was compiled from.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// The name table.
    pub fn names(&self) -> &[NameEntry] {
        &self.names
    }

    /// The type table.
    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    /// The struct table.
    pub fn structs(&self) -> &[StructDescriptor] {
        &self.structs
    }

    pub(crate) fn structs_mut(&mut self) -> &mut [StructDescriptor] {
        &mut self.structs
    }

    /// Struct at `index`.
    pub fn structure(&self, index: usize) -> Option<&StructDescriptor> {
        self.structs.get(index)
    }

    /// Index of the struct describing the type `name`.
    pub fn find_struct(&self, name: &str) -> Option<usize> {
        self.find_struct_by_hash(name_hash(name))
    }

    /// Index of the struct whose type name hashes to `hash`.
    pub fn find_struct_by_hash(&self, hash: u64) -> Option<usize> {
        self.type_lookup.find(&hash).copied()
    }

    /// Type name of the struct at `index`.
    pub fn struct_name(&self, index: usize) -> Option<&str> {
        let s = self.structs.get(index)?;
        Some(self.types[s.type_index].name.as_str())
    }

    /// Type name of a member.
    pub fn member_type(&self, member: &Member) -> &TypeEntry {
        &self.types[member.type_index]
    }

    /// Parsed declaration of a member.
    pub fn member_name(&self, member: &Member) -> &NameEntry {
        &self.names[member.name_index]
    }

    /// Primitive kind of a member, if it is a non-pointer numeric leaf.
    pub fn member_primitive(&self, member: &Member) -> Option<Primitive> {
        if member.is_pointer() {
            return None;
        }
        self.types[member.type_index].primitive
    }

    /// Looks up a member by path. Nested members are addressed as `outer.inner`
    /// (first element of any enclosing array).
    pub fn find_member(&self, struct_name: &str, path: &str) -> Option<&Member> {
        let s = self.structs.get(self.find_struct(struct_name)?)?;
        let parts: Vec<u64> = path.split('.').map(name_hash).collect();
        let (leaf, ancestors) = parts.split_last()?;

        s.members.iter().find(|m| {
            m.name_hash == *leaf
                && m.key_chain.len() == ancestors.len()
                && m
                    .key_chain
                    .iter()
                    .zip(ancestors)
                    .all(|(link, hash)| link.name_hash == *hash && link.element == 0)
        })
    }

    /// Indices of structs flagged `MISALIGNED`.
    pub fn misaligned(&self) -> impl Iterator<Item = usize> + '_ {
        self.structs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_misaligned())
            .map(|(i, _)| i)
    }
}
