use std::fmt;

pub mod span;
pub mod uuid;

pub use self::uuid::Uuid;
pub use span::{LineColumn, Span, SpanBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    I32,
    U32,
    F32,
    F64,
}
impl PrimitiveType {
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }
    pub fn is_numeric(&self) -> bool {
        self.is_float() || self.is_integer()
    }
    pub fn size(&self) -> u32 {
        match self {
            Self::F64 => 8,
            _ => 4,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        let out = match name {
            "bool" => Self::Bool,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        };
        Some(out)
    }
}
impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! def_constant_accessors {
    ($($name:ident => $ty:ty,)+) => {
        impl ConstantValue {
            $(
                paste::paste! {
                    #[allow(dead_code)]
                    pub fn [<as_ $name:lower>](&self) -> Option<$ty> {
                        match self {
                            ConstantValue::$name(x) => Some(*x),
                            _ => None,
                        }
                    }
                    #[allow(dead_code)]
                    pub fn [<is_ $name:lower>](&self) -> bool {
                        self.[<as_ $name:lower>]().is_some()
                    }
                }
            )+

            pub fn primitive_type(&self) -> PrimitiveType {
                match self {
                    $(
                        ConstantValue::$name(_) => PrimitiveType::$name,
                    )+
                    ConstantValue::Vector(xs) => xs
                        .first()
                        .map(|x| x.primitive_type())
                        .unwrap_or(PrimitiveType::F32),
                }
            }
        }
    };
}

/// Typed literal value. Vectors hold 2 to 4 scalars of a single primitive
/// type.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    Vector(Vec<ConstantValue>),
}
def_constant_accessors! {
    Bool => bool,
    I32 => i32,
    U32 => u32,
    F32 => f32,
    F64 => f64,
}
impl ConstantValue {
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
    pub fn component_count(&self) -> Option<u32> {
        match self {
            Self::Vector(xs) => Some(xs.len() as u32),
            _ => None,
        }
    }

    /// Converts a scalar into another primitive type the way a `T(x)` cast
    /// does at runtime.
    pub fn convert(&self, to: PrimitiveType) -> Option<ConstantValue> {
        let out = match (self, to) {
            (Self::Vector(xs), _) => {
                return xs
                    .iter()
                    .map(|x| x.convert(to))
                    .collect::<Option<Vec<_>>>()
                    .map(Self::Vector)
            }
            (Self::Bool(x), PrimitiveType::Bool) => Self::Bool(*x),
            (Self::Bool(_), _) | (_, PrimitiveType::Bool) => return None,
            (Self::I32(x), PrimitiveType::I32) => Self::I32(*x),
            (Self::I32(x), PrimitiveType::U32) => Self::U32(*x as u32),
            (Self::I32(x), PrimitiveType::F32) => Self::F32(*x as f32),
            (Self::I32(x), PrimitiveType::F64) => Self::F64(*x as f64),
            (Self::U32(x), PrimitiveType::I32) => Self::I32(*x as i32),
            (Self::U32(x), PrimitiveType::U32) => Self::U32(*x),
            (Self::U32(x), PrimitiveType::F32) => Self::F32(*x as f32),
            (Self::U32(x), PrimitiveType::F64) => Self::F64(*x as f64),
            (Self::F32(x), PrimitiveType::I32) => Self::I32(*x as i32),
            (Self::F32(x), PrimitiveType::U32) => Self::U32(*x as u32),
            (Self::F32(x), PrimitiveType::F32) => Self::F32(*x),
            (Self::F32(x), PrimitiveType::F64) => Self::F64(*x as f64),
            (Self::F64(x), PrimitiveType::I32) => Self::I32(*x as i32),
            (Self::F64(x), PrimitiveType::U32) => Self::U32(*x as u32),
            (Self::F64(x), PrimitiveType::F32) if (*x as f32).is_finite() => Self::F32(*x as f32),
            (Self::F64(_), PrimitiveType::F32) => return None,
            (Self::F64(x), PrimitiveType::F64) => Self::F64(*x),
        };
        Some(out)
    }
}

/// FNV-1a over a byte string, used to derive stable identifiers.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811c9dc5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}
