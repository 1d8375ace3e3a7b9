use serde::Serialize;

/// Numeric family of a primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NumericClass {
    /// Two's-complement signed integer.
    Signed,
    /// Unsigned integer.
    Unsigned,
    /// IEEE-754 float.
    Float,
}

/// A primitive numeric type: its family and its width from the schema's length table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Primitive {
    /// Numeric family.
    pub class: NumericClass,
    /// Width in bytes (1, 2, 4 or 8).
    pub size: u8,
}

/// A decoded primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Any integer, wide enough for both `i64` and `u64`.
    Int(i128),
    /// Any float.
    Float(f64),
}

impl Primitive {
    /// Classifies a type by name and width. Returns `None` for non-numeric types.
    pub fn from_type(name: &str, len: usize) -> Option<Self> {
        let class = match name {
            "char" | "int8_t" | "short" | "int16_t" | "int" | "int32_t" | "long" | "int64_t"
            | "long long" | "ssize_t" => NumericClass::Signed,
            "uchar" | "uint8_t" | "bool" | "ushort" | "uint16_t" | "uint" | "uint32_t"
            | "ulong" | "uint64_t" | "size_t" => NumericClass::Unsigned,
            "float" | "double" => NumericClass::Float,
            _ => return None,
        };
        let size = match (class, len) {
            (NumericClass::Float, 4 | 8) => len as u8,
            (NumericClass::Float, _) => return None,
            (_, 1 | 2 | 4 | 8) => len as u8,
            _ => return None,
        };
        Some(Self { class, size })
    }

    /// True for signed and unsigned integers.
    pub fn is_integer(&self) -> bool {
        self.class != NumericClass::Float
    }

    /// Width in bytes.
    pub fn width(&self) -> usize {
        usize::from(self.size)
    }

    /// Decodes one value from the first [`Primitive::width`] bytes of `bytes`, reversing
    /// the byte order first when `swap` is set.
    pub fn read(&self, bytes: &[u8], swap: bool) -> Value {
        let mut raw = [0u8; 8];
        let width = self.width();
        raw[..width].copy_from_slice(&bytes[..width]);
        if swap {
            raw[..width].reverse();
        }

        match (self.class, self.size) {
            (NumericClass::Float, 4) => {
                Value::Float(f64::from(f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])))
            }
            (NumericClass::Float, _) => Value::Float(f64::from_ne_bytes(raw)),
            (NumericClass::Signed, 1) => Value::Int(i128::from(raw[0] as i8)),
            (NumericClass::Signed, 2) => {
                Value::Int(i128::from(i16::from_ne_bytes([raw[0], raw[1]])))
            }
            (NumericClass::Signed, 4) => Value::Int(i128::from(i32::from_ne_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            (NumericClass::Signed, _) => Value::Int(i128::from(i64::from_ne_bytes(raw))),
            (NumericClass::Unsigned, 1) => Value::Int(i128::from(raw[0])),
            (NumericClass::Unsigned, 2) => {
                Value::Int(i128::from(u16::from_ne_bytes([raw[0], raw[1]])))
            }
            (NumericClass::Unsigned, 4) => Value::Int(i128::from(u32::from_ne_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            (NumericClass::Unsigned, _) => Value::Int(i128::from(u64::from_ne_bytes(raw))),
        }
    }

    /// Encodes `value` in native byte order into the first [`Primitive::width`] bytes
    /// of `out`.
    ///
    /// Integers narrow by truncation and widen by sign or zero extension, as a C cast
    /// does. Floats convert to integers with Rust's saturating `as`.
    pub fn write(&self, value: Value, out: &mut [u8]) {
        let width = self.width();
        match self.class {
            NumericClass::Float => {
                let f = match value {
                    Value::Int(i) => i as f64,
                    Value::Float(f) => f,
                };
                if width == 4 {
                    out[..4].copy_from_slice(&(f as f32).to_ne_bytes());
                } else {
                    out[..8].copy_from_slice(&f.to_ne_bytes());
                }
            }
            NumericClass::Signed | NumericClass::Unsigned => {
                let bits: u64 = match value {
                    Value::Int(i) => i as u64,
                    Value::Float(f) if self.class == NumericClass::Signed => (f as i64) as u64,
                    Value::Float(f) => f as u64,
                };
                match width {
                    1 => out[0] = bits as u8,
                    2 => out[..2].copy_from_slice(&(bits as u16).to_ne_bytes()),
                    4 => out[..4].copy_from_slice(&(bits as u32).to_ne_bytes()),
                    _ => out[..8].copy_from_slice(&bits.to_ne_bytes()),
                }
            }
        }
    }
}
