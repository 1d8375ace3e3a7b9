use super::names::NameEntry;
use crate::error::{Result, StrandError};
use crate::format::{Endian, PointerWidth};

/// Primitive types registered by [`SchemaBuilder::with_primitives`].
const PRIMITIVES: &[(&str, u16)] = &[
    ("char", 1),
    ("uchar", 1),
    ("short", 2),
    ("ushort", 2),
    ("int", 4),
    ("uint", 4),
    ("int64_t", 8),
    ("uint64_t", 8),
    ("float", 4),
    ("double", 8),
    ("void", 0),
];

#[derive(Debug, Clone)]
struct TypeDecl {
    name: String,
    length: Option<u16>,
}

#[derive(Debug, Clone)]
struct StructDecl {
    type_index: usize,
    members: Vec<(usize, usize)>,
}

/// Builds schema descriptor blobs in code.
///
/// Types are registered on first mention. Primitive lengths are given explicitly; struct
/// lengths are computed from their members at build time, pointers counting the builder's
/// pointer width.
///
/// ```rust
/// use strand::schema::{SchemaBuilder, SchemaTable};
/// use strand::format::{Endian, PointerWidth};
///
/// let blob = SchemaBuilder::new(PointerWidth::Eight)
///     .with_primitives()
///     .structure("Node", &[("Node", "*next"), ("float", "weight[3]")])
///     .build()?;
/// let table = SchemaTable::compile(&blob, PointerWidth::Eight, Endian::native())?;
/// assert_eq!(table.structs()[0].length, 8 + 12);
/// # Ok::<(), strand::StrandError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    pointer_width: PointerWidth,
    endian: Endian,
    names: Vec<String>,
    types: Vec<TypeDecl>,
    structs: Vec<StructDecl>,
    overrides: Vec<(usize, u16)>,
}

impl SchemaBuilder {
    /// A builder laying pointers out `pointer_width` wide, writing native byte order.
    pub fn new(pointer_width: PointerWidth) -> Self {
        Self {
            pointer_width,
            endian: Endian::native(),
            names: Vec::new(),
            types: Vec::new(),
            structs: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Writes the blob's integers in `endian` order.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Registers the common primitive types.
    pub fn with_primitives(mut self) -> Self {
        for (name, len) in PRIMITIVES {
            self = self.primitive(name, *len);
        }
        self
    }

    /// Registers a type with a fixed length, or updates its length.
    pub fn primitive(mut self, name: &str, length: u16) -> Self {
        let index = self.type_index(name);
        self.types[index].length = Some(length);
        self
    }

    /// Declares a struct from `(type, declaration)` pairs in layout order.
    pub fn structure(mut self, name: &str, members: &[(&str, &str)]) -> Self {
        let type_index = self.type_index(name);
        let members = members
            .iter()
            .map(|(ty, decl)| (self.type_index(ty), self.name_index(decl)))
            .collect();
        self.structs.push(StructDecl {
            type_index,
            members,
        });
        self
    }

    /// Declares a struct length instead of computing it.
    pub fn override_length(mut self, name: &str, length: u16) -> Self {
        let index = self.type_index(name);
        self.overrides.push((index, length));
        self
    }

    fn type_index(&mut self, name: &str) -> usize {
        if let Some(i) = self.types.iter().position(|t| t.name == name) {
            return i;
        }
        self.types.push(TypeDecl {
            name: name.to_string(),
            length: None,
        });
        self.types.len() - 1
    }

    fn name_index(&mut self, decl: &str) -> usize {
        if let Some(i) = self.names.iter().position(|n| n == decl) {
            return i;
        }
        self.names.push(decl.to_string());
        self.names.len() - 1
    }

    /// Resolves every type length and emits the descriptor blob.
    ///
    /// # Errors
    /// [`StrandError::Schema`] for a type with no known length, a struct that contains
    /// itself by value, a malformed declaration, or a length above `u16::MAX`.
    pub fn build(&self) -> Result<Vec<u8>> {
        let parsed = self
            .names
            .iter()
            .map(|n| NameEntry::parse(n))
            .collect::<Result<Vec<_>>>()?;

        let mut lengths: Vec<Option<u16>> = self.types.iter().map(|t| t.length).collect();
        for (index, length) in &self.overrides {
            lengths[*index] = Some(*length);
        }
        for i in 0..self.types.len() {
            let mut visiting = Vec::new();
            self.resolve_length(i, &parsed, &mut lengths, &mut visiting)?;
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"SDNA");

        out.extend_from_slice(b"NAME");
        self.endian.put_u32(&mut out, self.names.len() as u32);
        for name in &self.names {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        pad4(&mut out);

        out.extend_from_slice(b"TYPE");
        self.endian.put_u32(&mut out, self.types.len() as u32);
        for ty in &self.types {
            out.extend_from_slice(ty.name.as_bytes());
            out.push(0);
        }
        pad4(&mut out);

        out.extend_from_slice(b"TLEN");
        for length in &lengths {
            self.endian.put_u16(&mut out, length.unwrap_or(0));
        }
        pad4(&mut out);

        out.extend_from_slice(b"STRC");
        self.endian.put_u32(&mut out, self.structs.len() as u32);
        for decl in &self.structs {
            self.endian.put_u16(&mut out, decl.type_index as u16);
            self.endian.put_u16(&mut out, decl.members.len() as u16);
            for (t, n) in &decl.members {
                self.endian.put_u16(&mut out, *t as u16);
                self.endian.put_u16(&mut out, *n as u16);
            }
        }

        Ok(out)
    }

    fn resolve_length(
        &self,
        index: usize,
        names: &[NameEntry],
        lengths: &mut [Option<u16>],
        visiting: &mut Vec<usize>,
    ) -> Result<u16> {
        if let Some(length) = lengths[index] {
            return Ok(length);
        }
        let name = &self.types[index].name;
        let Some(decl) = self.structs.iter().find(|s| s.type_index == index) else {
            return Err(StrandError::Schema(format!("type '{name}' has no length")));
        };
        if visiting.contains(&index) {
            return Err(StrandError::Schema(format!("struct '{name}' contains itself")));
        }
        visiting.push(index);

        let mut total = 0usize;
        for (t, n) in &decl.members {
            let entry = &names[*n];
            let element = if entry.is_pointer() {
                self.pointer_width.bytes()
            } else {
                usize::from(self.resolve_length(*t, names, lengths, visiting)?)
            };
            total += element * entry.array_size as usize;
        }
        visiting.pop();

        let length = u16::try_from(total).map_err(|_| {
            StrandError::Schema(format!("struct '{name}' is {total} bytes, above u16::MAX"))
        })?;
        lengths[index] = Some(length);
        Ok(length)
    }
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}
