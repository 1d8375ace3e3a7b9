#![allow(missing_docs, dead_code)]

use strand::format::{
    ChunkCode, ChunkHeader, Endian, FileHeader, HeaderFlags, OldAddr, PointerWidth,
};
use strand::{Result, SchemaBuilder};

/// Assembles a document byte by byte, the way a writing program would.
pub struct DocBuilder {
    flags: HeaderFlags,
    endian: Endian,
    bytes: Vec<u8>,
}

impl DocBuilder {
    pub fn new(pointer_width: PointerWidth, endian: Endian) -> Self {
        Self::with_signature(b"STRAND!", pointer_width, endian)
    }

    pub fn with_signature(signature: &[u8], pointer_width: PointerWidth, endian: Endian) -> Self {
        let header = FileHeader::new(signature, pointer_width, endian, 300);
        Self {
            flags: HeaderFlags::new(
                pointer_width == PointerWidth::Eight,
                false,
                endian != Endian::native(),
            ),
            endian,
            bytes: header.to_bytes(),
        }
    }

    pub fn native() -> Self {
        Self::new(PointerWidth::native(), Endian::native())
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn chunk(
        mut self,
        code: ChunkCode,
        old: u64,
        type_index: u32,
        count: u32,
        payload: &[u8],
    ) -> Result<Self> {
        let header = ChunkHeader {
            code,
            len: payload.len() as u32,
            old: OldAddr(old),
            type_index,
            count,
        };
        header.encode_into(self.flags, &mut self.bytes)?;
        self.bytes.extend_from_slice(payload);
        Ok(self)
    }

    pub fn data(self, old: u64, type_index: u32, count: u32, payload: &[u8]) -> Result<Self> {
        self.chunk(ChunkCode::DATA, old, type_index, count, payload)
    }

    pub fn schema(self, blob: &[u8]) -> Result<Self> {
        self.chunk(ChunkCode::DNA1, 0, 0, 1, blob)
    }

    pub fn end(self) -> Result<Vec<u8>> {
        let bytes = self.chunk(ChunkCode::ENDB, 0, 0, 0, &[])?.bytes;
        Ok(bytes)
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encodes integers of any width in `endian` order.
pub fn ints<T: Copy + Into<i128>>(values: &[T], width: usize, endian: Endian) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        let v: i128 = (*v).into();
        let bytes = (v as u64).to_le_bytes();
        let mut field = bytes[..width].to_vec();
        if endian == Endian::Big {
            field.reverse();
        }
        out.extend_from_slice(&field);
    }
    out
}

pub fn i32s(values: &[i32], endian: Endian) -> Vec<u8> {
    ints(values, 4, endian)
}

pub fn pointer(value: u64, width: PointerWidth, endian: Endian) -> Vec<u8> {
    ints(&[value as i128], width.bytes(), endian)
}

pub fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub fn read_pointer(bytes: &[u8], at: usize, width: PointerWidth) -> u64 {
    match width {
        PointerWidth::Four => u64::from(u32::from_ne_bytes([
            bytes[at],
            bytes[at + 1],
            bytes[at + 2],
            bytes[at + 3],
        ])),
        PointerWidth::Eight => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_ne_bytes(raw)
        }
    }
}

/// `Point { int x; int y; }`, struct 0.
pub fn point_v1(pointer_width: PointerWidth) -> SchemaBuilder {
    SchemaBuilder::new(pointer_width)
        .with_primitives()
        .structure("Point", &[("int", "x"), ("int", "y")])
}

/// `Point { int x; int y; int z; }`, struct 0.
pub fn point_v2(pointer_width: PointerWidth) -> SchemaBuilder {
    SchemaBuilder::new(pointer_width)
        .with_primitives()
        .structure("Point", &[("int", "x"), ("int", "y"), ("int", "z")])
}
