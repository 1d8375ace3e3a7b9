use crate::error::{Result, StrandError};
use crate::hash::name_hash;

/// Most array dimensions a declaration may carry.
pub const MAX_ARRAY_DIMS: usize = 3;

/// A field declaration such as `*next`, `name[64]`, `mat[4][4]` or `(*draw)()`,
/// decomposed once when the schema is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// The declaration as written in the schema.
    pub text: String,
    /// Bare identifier with stars, parentheses and dimensions removed.
    pub base: String,
    /// Hash of the full declaration.
    pub hash: u64,
    /// Hash of the bare identifier; used for matching across schemas.
    pub base_hash: u64,
    /// Number of leading `*`.
    pub pointer_depth: u8,
    /// Declared as `(*name)(...)`.
    pub is_function_pointer: bool,
    /// Array extents in declaration order.
    pub dimensions: Vec<u32>,
    /// Product of all extents, 1 for scalars.
    pub array_size: u32,
}

impl NameEntry {
    /// Parses one declaration.
    ///
    /// # Errors
    /// Returns [`StrandError::Schema`] for an empty identifier, a zero or unparsable
    /// extent, unbalanced brackets, or more than [`MAX_ARRAY_DIMS`] dimensions.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |why: &str| StrandError::Schema(format!("declaration '{text}': {why}"));

        let trimmed = text.trim();
        let is_function_pointer = trimmed.starts_with("(*");

        let mut base = String::new();
        let mut base_done = false;
        let mut pointer_depth = 0u8;
        let mut dimensions = Vec::new();

        let mut chars = trimmed.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' if base.is_empty() => pointer_depth = pointer_depth.saturating_add(1),
                '[' => {
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(d) if d.is_whitespace() => {}
                            _ => return Err(bad("unterminated or non-numeric extent")),
                        }
                    }
                    let extent: u32 = digits.parse().map_err(|_| bad("empty extent"))?;
                    if extent == 0 {
                        return Err(bad("zero extent"));
                    }
                    dimensions.push(extent);
                    base_done = true;
                }
                c if !base_done && (c.is_ascii_alphanumeric() || c == '_') => base.push(c),
                _ => {
                    if !base.is_empty() {
                        base_done = true;
                    }
                }
            }
        }

        if base.is_empty() {
            return Err(bad("no identifier"));
        }
        if dimensions.len() > MAX_ARRAY_DIMS {
            return Err(bad("too many dimensions"));
        }

        let array_size = dimensions
            .iter()
            .try_fold(1u32, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| bad("array size overflows"))?;

        Ok(Self {
            hash: name_hash(trimmed),
            base_hash: name_hash(&base),
            text: trimmed.to_string(),
            base,
            pointer_depth,
            is_function_pointer,
            dimensions,
            array_size,
        })
    }

    /// True for pointers and function pointers.
    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    /// True for arrays of any dimension.
    pub fn is_array(&self) -> bool {
        !self.dimensions.is_empty()
    }
}
