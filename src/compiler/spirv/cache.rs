//! De-duplicating caches for types and constants. Every distinct type or
//! constant is declared once and referred to by id afterwards.
use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::compiler::ast::SamplerDim;
use crate::compiler::common::ConstantValue;
use crate::compiler::sema::DeclId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpirvType {
    Void,
    Bool,
    Int { signed: bool },
    Float { width: u32 },
    Vector(Box<SpirvType>, u32),
    /// Column type, column count.
    Matrix(Box<SpirvType>, u32),
    /// Element type, length, stride.
    Array(Box<SpirvType>, u32, u32),
    Struct(DeclId),
    Image(SamplerDim, Box<SpirvType>),
    SampledImage(Box<SpirvType>),
    Pointer(spirv::StorageClass, Box<SpirvType>),
    Function(Box<SpirvType>, Vec<SpirvType>),
}
impl SpirvType {
    pub fn pointer(storage: spirv::StorageClass, ty: SpirvType) -> Self {
        Self::Pointer(storage, Box::new(ty))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantKey {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
    /// Type and component ids.
    Composite(SpirvType, Vec<u32>),
}
impl ConstantKey {
    /// Key of a scalar constant. Vectors are keyed by their component ids.
    pub fn scalar(value: &ConstantValue) -> Option<Self> {
        let out = match value {
            ConstantValue::Bool(x) => Self::Bool(*x),
            ConstantValue::I32(x) => Self::I32(*x),
            ConstantValue::U32(x) => Self::U32(*x),
            ConstantValue::F32(x) => Self::F32(OrderedFloat(*x)),
            ConstantValue::F64(x) => Self::F64(OrderedFloat(*x)),
            ConstantValue::Vector(_) => return None,
        };
        Some(out)
    }
}

#[derive(Debug, Default)]
pub struct SpirvCache {
    types: HashMap<SpirvType, u32>,
    constants: HashMap<ConstantKey, u32>,
}
impl SpirvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_type(&self, ty: &SpirvType) -> Option<u32> {
        let out = self.types.get(ty).copied();
        if out.is_some() {
            tracing::trace!(?ty, "type cache hit");
        }
        out
    }
    pub fn insert_type(&mut self, ty: SpirvType, id: u32) {
        self.types.insert(ty, id);
    }

    pub fn get_constant(&self, key: &ConstantKey) -> Option<u32> {
        let out = self.constants.get(key).copied();
        if out.is_some() {
            tracing::trace!(?key, "constant cache hit");
        }
        out
    }
    pub fn insert_constant(&mut self, key: ConstantKey, id: u32) {
        self.constants.insert(key, id);
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }
}
