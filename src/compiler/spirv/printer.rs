//! Textual listing of a SPIR-V binary, one instruction per line in the
//! usual assembly form (`%3 = OpTypeFloat 32`).
use std::collections::HashMap;
use std::fmt::Write;

use anyhow::Result;
use num_traits::FromPrimitive;
use spirv::Op;

use super::decode::{decode, DecodedInstr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterSettings {
    pub print_header: bool,
    /// Print operands, or only the opcode of every instruction.
    pub print_parameters: bool,
}
impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            print_header: true,
            print_parameters: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Id,
    Literal,
    Str,
    /// Bitmask, printed `None` when empty.
    Mask,
    Capability,
    AddressingModel,
    MemoryModel,
    ExecutionModel,
    ExecutionMode,
    Decoration,
    StorageClass,
    Dim,
    ImageFormat,
}

/// Whether the instruction has a result type and a result id, the kinds
/// of its leading operands and the kind of any trailing ones.
struct Layout {
    result_type: bool,
    result_id: bool,
    fixed: &'static [Kind],
    rest: Option<Kind>,
}

const fn layout(result_type: bool, result_id: bool, fixed: &'static [Kind], rest: Option<Kind>) -> Layout {
    Layout {
        result_type,
        result_id,
        fixed,
        rest,
    }
}

fn layout_of(op: Op) -> Layout {
    use Kind::*;
    match op {
        Op::Capability => layout(false, false, &[Capability], None),
        Op::Extension => layout(false, false, &[Str], None),
        Op::ExtInstImport => layout(false, true, &[Str], None),
        Op::MemoryModel => layout(false, false, &[AddressingModel, MemoryModel], None),
        Op::EntryPoint => layout(false, false, &[ExecutionModel, Id, Str], Some(Id)),
        Op::ExecutionMode => layout(false, false, &[Id, ExecutionMode], Some(Literal)),
        Op::Name => layout(false, false, &[Id, Str], None),
        Op::MemberName => layout(false, false, &[Id, Literal, Str], None),
        Op::Decorate => layout(false, false, &[Id, Decoration], Some(Literal)),
        Op::MemberDecorate => layout(false, false, &[Id, Literal, Decoration], Some(Literal)),
        Op::TypeVoid | Op::TypeBool | Op::Label => layout(false, true, &[], None),
        Op::TypeInt => layout(false, true, &[Literal, Literal], None),
        Op::TypeFloat => layout(false, true, &[Literal], None),
        Op::TypeVector | Op::TypeMatrix => layout(false, true, &[Id, Literal], None),
        Op::TypeArray => layout(false, true, &[Id, Id], None),
        Op::TypeImage => layout(
            false,
            true,
            &[Id, Dim, Literal, Literal, Literal, Literal, ImageFormat],
            Some(Literal),
        ),
        Op::TypeSampledImage => layout(false, true, &[Id], None),
        Op::TypeStruct => layout(false, true, &[], Some(Id)),
        Op::TypePointer => layout(false, true, &[StorageClass, Id], None),
        Op::TypeFunction => layout(false, true, &[Id], Some(Id)),
        Op::ConstantTrue | Op::ConstantFalse | Op::FunctionParameter => layout(true, true, &[], None),
        Op::Constant => layout(true, true, &[], Some(Literal)),
        Op::Variable => layout(true, true, &[StorageClass], Some(Id)),
        Op::Function => layout(true, true, &[Mask, Id], None),
        Op::FunctionEnd | Op::Return | Op::Kill | Op::Unreachable => layout(false, false, &[], None),
        Op::Load => layout(true, true, &[Id], Some(Literal)),
        Op::Store => layout(false, false, &[Id, Id], Some(Literal)),
        Op::ExtInst => layout(true, true, &[Id, Literal], Some(Id)),
        Op::CompositeExtract => layout(true, true, &[Id], Some(Literal)),
        Op::VectorShuffle => layout(true, true, &[Id, Id], Some(Literal)),
        Op::ImageSampleImplicitLod | Op::ImageSampleExplicitLod => layout(true, true, &[Id, Id], Some(Literal)),
        Op::SelectionMerge | Op::LoopMerge => layout(false, false, &[Id, Mask], Some(Literal)),
        Op::BranchConditional => layout(false, false, &[Id, Id, Id], Some(Literal)),
        Op::Branch | Op::ReturnValue => layout(false, false, &[Id], None),
        // Value instructions taking ids only.
        _ => layout(true, true, &[], Some(Id)),
    }
}

fn enumerant<T: FromPrimitive + std::fmt::Debug>(word: u32) -> String {
    match T::from_u32(word) {
        Some(x) => format!("{:?}", x),
        None => word.to_string(),
    }
}

/// Decodes a nul-terminated string, returning it and the words it spans.
fn decode_str(words: &[u32]) -> (String, usize) {
    let mut bytes = Vec::new();
    for (i, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return (String::from_utf8_lossy(&bytes).into_owned(), i + 1);
            }
            bytes.push(byte);
        }
    }
    (String::from_utf8_lossy(&bytes).into_owned(), words.len())
}

pub struct SpirvPrinter {
    settings: PrinterSettings,
}
impl SpirvPrinter {
    pub fn new(settings: PrinterSettings) -> Self {
        Self { settings }
    }

    pub fn print(&self, words: &[u32]) -> Result<String> {
        let module = decode(words)?;
        let mut out = String::new();
        if self.settings.print_header {
            let (major, minor) = module.header.version_numbers();
            writeln!(out, "; SPIR-V")?;
            writeln!(out, "; Version: {}.{}", major, minor)?;
            writeln!(out, "; Generator: {:#010x}", module.header.generator)?;
            writeln!(out, "; Bound: {}", module.header.bound)?;
            writeln!(out, "; Schema: {}", module.header.schema)?;
        }
        // Widths of the float types seen so far, by result id.
        let mut floats = HashMap::new();
        for instr in &module.instrs {
            if let (Some(Op::TypeFloat), [id, width, ..]) = (instr.op, instr.operands.as_slice()) {
                floats.insert(*id, *width);
            }
            let line = if self.settings.print_parameters {
                self.instr(instr, &floats)
            } else {
                op_name(instr)
            };
            writeln!(out, "{}", line)?;
        }
        Ok(out)
    }

    fn instr(&self, instr: &DecodedInstr, floats: &HashMap<u32, u32>) -> String {
        let Some(op) = instr.op else {
            let mut out = op_name(instr);
            for word in &instr.operands {
                out.push_str(&format!(" {}", word));
            }
            return out;
        };
        let layout = layout_of(op);
        let mut words = instr.operands.as_slice();
        let mut prefix = String::new();
        let mut operands = Vec::new();

        let mut float_width = None;
        if layout.result_type {
            if let Some((ty, tail)) = words.split_first() {
                operands.push(format!("%{}", ty));
                float_width = floats.get(ty).copied();
                words = tail;
            }
        }
        if layout.result_id {
            if let Some((id, tail)) = words.split_first() {
                prefix = format!("%{} = ", id);
                words = tail;
            }
        }
        let mut decoration = None;
        for kind in layout.fixed {
            if words.is_empty() {
                break;
            }
            let (text, used) = operand(*kind, words);
            if let Kind::Decoration = kind {
                decoration = spirv::Decoration::from_u32(words[0]);
            }
            operands.push(text);
            words = &words[used..];
        }
        if let (Op::Constant, Some(width)) = (op, float_width) {
            if let Some(value) = float_literal(width, words) {
                operands.push(value);
                words = &[];
            }
        }
        if let Some(kind) = layout.rest {
            while !words.is_empty() {
                let (text, used) = match decoration {
                    Some(spirv::Decoration::BuiltIn) => (enumerant::<spirv::BuiltIn>(words[0]), 1),
                    _ => operand(kind, words),
                };
                operands.push(text);
                words = &words[used..];
            }
        }

        let mut out = prefix;
        out.push_str(&op_name(instr));
        for operand in operands {
            out.push(' ');
            out.push_str(&operand);
        }
        out
    }
}
impl Default for SpirvPrinter {
    fn default() -> Self {
        Self::new(PrinterSettings::default())
    }
}

fn op_name(instr: &DecodedInstr) -> String {
    match instr.op {
        Some(op) => format!("Op{:?}", op),
        None => format!("OpUnknown({})", instr.opcode),
    }
}

/// Formats the value of a float constant, low-order word first.
fn float_literal(width: u32, words: &[u32]) -> Option<String> {
    match (width, words) {
        (32, [bits]) => Some(format!("{:?}", f32::from_bits(*bits))),
        (64, [low, high]) => Some(format!("{:?}", f64::from_bits(u64::from(*low) | (u64::from(*high) << 32)))),
        _ => None,
    }
}

/// Formats the operand at the start of `words`, returning the number of
/// words consumed.
fn operand(kind: Kind, words: &[u32]) -> (String, usize) {
    let word = words[0];
    let text = match kind {
        Kind::Id => format!("%{}", word),
        Kind::Literal => word.to_string(),
        Kind::Str => {
            let (text, used) = decode_str(words);
            return (format!("{:?}", text), used);
        }
        Kind::Mask if word == 0 => "None".to_string(),
        Kind::Mask => format!("{:#x}", word),
        Kind::Capability => enumerant::<spirv::Capability>(word),
        Kind::AddressingModel => enumerant::<spirv::AddressingModel>(word),
        Kind::MemoryModel => enumerant::<spirv::MemoryModel>(word),
        Kind::ExecutionModel => enumerant::<spirv::ExecutionModel>(word),
        Kind::ExecutionMode => enumerant::<spirv::ExecutionMode>(word),
        Kind::Decoration => enumerant::<spirv::Decoration>(word),
        Kind::StorageClass => enumerant::<spirv::StorageClass>(word),
        Kind::Dim => enumerant::<spirv::Dim>(word).trim_start_matches("Dim").to_string(),
        Kind::ImageFormat => enumerant::<spirv::ImageFormat>(word),
    };
    (text, 1)
}
