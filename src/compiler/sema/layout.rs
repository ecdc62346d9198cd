//! Byte offsets of struct members under the std140 and std430 rules.
use anyhow::{anyhow, bail, Result};

use super::{Analysis, DeclId, ExpressionType};
use crate::compiler::ast::MemoryLayout;
use crate::compiler::common::PrimitiveType;
use crate::compiler::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub fields: Vec<FieldLayout>,
    pub size: u32,
    pub align: u32,
}

fn round_up(x: u32, align: u32) -> Option<u32> {
    if align == 0 {
        Some(x)
    } else {
        Some(x.checked_add(align - 1)? / align * align)
    }
}

fn too_large(ty: &ExpressionType) -> anyhow::Error {
    CompileError::without_span(format!("{} is too large to be laid out in memory", ty)).into()
}

/// Rule a struct is laid out with: its `layout` attribute, or the default
/// of the block it is used in.
pub fn layout_rule(analysis: &Analysis, id: DeclId, default: MemoryLayout) -> MemoryLayout {
    analysis
        .struct_info(id)
        .and_then(|x| x.decl.layout)
        .unwrap_or(default)
}

fn vector_size_align(base: PrimitiveType, count: u32) -> (u32, u32) {
    let comp = base.size();
    let align = if count == 3 { comp * 4 } else { comp * count };
    (comp * count, align)
}

/// Distance between two columns of a matrix.
pub fn matrix_stride(base: PrimitiveType, rows: u32, rule: MemoryLayout) -> u32 {
    // Columns are at most 32 bytes, so none of this can overflow.
    let (size, align) = vector_size_align(base, rows);
    let align = if rule == MemoryLayout::Std140 { align.max(16) } else { align };
    (size + align - 1) / align * align
}

/// Distance between two elements of an array.
pub fn array_stride(analysis: &Analysis, element: &ExpressionType, rule: MemoryLayout) -> Result<u32> {
    let (size, align) = size_align(analysis, element, rule)?;
    let align = if rule == MemoryLayout::Std140 { align.max(16) } else { align };
    round_up(size, align).ok_or_else(|| too_large(element))
}

pub fn size_align(analysis: &Analysis, ty: &ExpressionType, rule: MemoryLayout) -> Result<(u32, u32)> {
    let out = match ty {
        ExpressionType::Primitive(x) => (x.size(), x.size()),
        ExpressionType::Vector(base, count) => vector_size_align(*base, *count),
        ExpressionType::Matrix(base, columns, rows) => {
            let stride = matrix_stride(*base, *rows, rule);
            let (_, align) = vector_size_align(*base, *rows);
            let align = if rule == MemoryLayout::Std140 { align.max(16) } else { align };
            (stride * columns, align)
        }
        ExpressionType::Array(element, length) => {
            let stride = array_stride(analysis, element, rule)?;
            let (_, align) = size_align(analysis, element, rule)?;
            let align = if rule == MemoryLayout::Std140 { align.max(16) } else { align };
            let size = stride.checked_mul(*length).ok_or_else(|| too_large(ty))?;
            (size, align)
        }
        ExpressionType::Struct(id) => {
            let layout = struct_layout(analysis, *id, rule)?;
            (layout.size, layout.align)
        }
        _ => bail!("{} has no memory layout", ty),
    };
    Ok(out)
}

/// Offsets of every field of struct `id`. A struct's own `layout`
/// attribute overrides `rule`.
pub fn struct_layout(analysis: &Analysis, id: DeclId, rule: MemoryLayout) -> Result<StructLayout> {
    let info = analysis
        .struct_info(id)
        .ok_or_else(|| anyhow!("declaration #{} is not a struct", id))?;
    let rule = info.decl.layout.unwrap_or(rule);
    let decl = analysis.decl(id);
    let overflow = || CompileError::new(format!("struct {} is too large to be laid out in memory", decl.name), decl.span);

    let mut fields = Vec::with_capacity(info.fields.len());
    let mut offset = 0u32;
    let mut max_align = 1;
    for field in &info.fields {
        let (size, align) = size_align(analysis, &field.ty, rule)?;
        offset = round_up(offset, align).ok_or_else(overflow)?;
        fields.push(FieldLayout { offset, size, align });
        offset = offset.checked_add(size).ok_or_else(overflow)?;
        max_align = max_align.max(align);
    }
    if rule == MemoryLayout::Std140 {
        max_align = max_align.max(16);
    }
    Ok(StructLayout {
        fields,
        size: round_up(offset, max_align).ok_or_else(overflow)?,
        align: max_align,
    })
}
