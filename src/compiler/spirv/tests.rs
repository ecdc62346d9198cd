use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::error::BackendError;
use crate::compiler::opt::{optimize, OptionSet};
use crate::compiler::sema::analyze;
use crate::compiler::syn::parse_source;

fn compile(body: &str, options: SpirvWriterOptions) -> Result<Vec<u32>> {
    let module = parse_source(&format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body))?;
    let analysis = analyze(&module)?;
    let module = optimize(&module, &analysis, OptionSet::new())?;
    let analysis = analyze(&module)?;
    SpirvWriter::new(options).generate(&module, &analysis)
}

fn decoded(body: &str) -> DecodedModule {
    let words = compile(body, SpirvWriterOptions::default()).unwrap();
    decode(&words).unwrap()
}

fn position(module: &DecodedModule, op: Op) -> usize {
    module.ops().position(|x| x == Some(op)).unwrap()
}

const BRANCH: &str = r#"
struct Data { value: f32 }

external
{
    [set(0), binding(0)] data: uniform[Data]
}

struct FragOut
{
    [location(0)] value: f32
}

[entry(frag)]
fn main() -> FragOut
{
    let value: f32;
    if (data.value > 0.0)
        value = 1.0;
    else
        value = 0.0;

    let output: FragOut;
    output.value = value;
    return output;
}
"#;

#[test]
fn test_branch_selection_merge() {
    let module = decoded(BRANCH);
    assert_eq!(module.count(Op::SelectionMerge), 1);
    assert_eq!(module.count(Op::BranchConditional), 1);

    let merge_at = position(&module, Op::SelectionMerge);
    let branch = &module.instrs[merge_at + 1];
    assert_eq!(branch.op, Some(Op::BranchConditional));
    let merge = module.instrs[merge_at].operands[0];
    let (true_label, false_label) = (branch.operands[1], branch.operands[2]);
    assert_ne!(true_label, merge);
    assert_ne!(false_label, merge);

    // Both arms store their value and jump to the merge block.
    let jumps = module
        .instrs
        .iter()
        .enumerate()
        .filter(|(_, x)| x.op == Some(Op::Branch) && x.operands == [merge])
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    assert_eq!(jumps.len(), 2);
    for i in jumps {
        assert_eq!(module.instrs[i - 1].op, Some(Op::Store));
    }
    let labels = module
        .instrs
        .iter()
        .filter(|x| x.op == Some(Op::Label))
        .map(|x| x.operands[0])
        .collect::<Vec<_>>();
    assert!(labels.contains(&true_label));
    assert!(labels.contains(&false_label));
    assert!(labels.contains(&merge));
}

#[test]
fn test_discard_terminates_arm() {
    const SOURCE: &str = r#"
struct Input { [location(0)] value: f32 }
struct Output { [location(0)] value: f32 }

[entry(frag)]
fn main(input: Input) -> Output
{
    if (input.value < 0.0)
        discard;

    let output: Output;
    output.value = input.value;
    return output;
}
"#;
    let module = decoded(SOURCE);
    assert_eq!(module.count(Op::SelectionMerge), 1);
    assert_eq!(module.count(Op::BranchConditional), 1);
    assert_eq!(module.count(Op::Kill), 1);
    assert_eq!(module.count(Op::Return), 1);

    let merge_at = position(&module, Op::SelectionMerge);
    let merge = module.instrs[merge_at].operands[0];
    let branch = &module.instrs[merge_at + 1];
    // Without an else arm the false edge goes straight to the merge block.
    assert_eq!(branch.operands[2], merge);
    let kill_at = position(&module, Op::Kill);
    assert_eq!(module.instrs[kill_at - 1].op, Some(Op::Label));
    assert_eq!(module.instrs[kill_at - 1].operands[0], branch.operands[1]);
    assert_ne!(module.instrs[kill_at + 1].op, Some(Op::Branch));

    let end = position(&module, Op::FunctionEnd);
    assert_eq!(module.instrs[end - 1].op, Some(Op::Return));
}

#[test]
fn test_entry_point_interface() {
    let words = compile(BRANCH, SpirvWriterOptions::default()).unwrap();
    assert_eq!(words[0], spirv::MAGIC_NUMBER);
    assert_eq!(words[1], 0x0001_0000);
    let module = decode(&words).unwrap();

    let entry = module.instrs.iter().find(|x| x.op == Some(Op::EntryPoint)).unwrap();
    assert_eq!(entry.operands[0], spirv::ExecutionModel::Fragment as u32);
    assert_eq!(entry.operands[2..4], instr::encode_str("main")[..]);
    // Only the output variable is part of the interface before 1.4.
    assert_eq!(entry.operands.len(), 5);

    let mode = module.instrs.iter().find(|x| x.op == Some(Op::ExecutionMode)).unwrap();
    assert_eq!(mode.operands, [entry.operands[1], spirv::ExecutionMode::OriginUpperLeft as u32]);

    let max_id = module
        .instrs
        .iter()
        .filter(|x| x.op == Some(Op::Label))
        .map(|x| x.operands[0])
        .max()
        .unwrap();
    assert!(module.header.bound > max_id);

    let words = compile(
        BRANCH,
        SpirvWriterOptions {
            spirv_minor_version: 4,
            ..SpirvWriterOptions::default()
        },
    )
    .unwrap();
    let module = decode(&words).unwrap();
    let entry = module.instrs.iter().find(|x| x.op == Some(Op::EntryPoint)).unwrap();
    assert_eq!(entry.operands.len(), 6);
}

#[test]
fn test_storage_buffer_decoration() {
    const SOURCE: &str = r#"
struct Data { value: f32 }

external
{
    [set(1), binding(2)] data: storage[Data]
}
"#;
    let decorations = |minor| {
        let options = SpirvWriterOptions {
            spirv_minor_version: minor,
            ..SpirvWriterOptions::default()
        };
        let module = decode(&compile(SOURCE, options).unwrap()).unwrap();
        module
            .instrs
            .iter()
            .filter(|x| x.op == Some(Op::Decorate))
            .map(|x| x.operands[1..].to_vec())
            .collect::<Vec<_>>()
    };
    let old = decorations(0);
    assert!(old.contains(&vec![Decoration::BufferBlock as u32]));
    assert!(old.contains(&vec![Decoration::DescriptorSet as u32, 1]));
    assert!(old.contains(&vec![Decoration::Binding as u32, 2]));
    let new = decorations(3);
    assert!(new.contains(&vec![Decoration::Block as u32]));
    assert!(!new.contains(&vec![Decoration::BufferBlock as u32]));
}

#[test]
fn test_writer_errors() {
    let err = compile(
        BRANCH,
        SpirvWriterOptions {
            spirv_minor_version: 7,
            ..SpirvWriterOptions::default()
        },
    )
    .unwrap_err();
    assert_eq!(
        err.downcast_ref::<BackendError>(),
        Some(&BackendError::UnsupportedSpirvVersion(1, 7))
    );

    let no_f64 = SpirvWriterOptions {
        allow_float64: false,
        ..SpirvWriterOptions::default()
    };
    let err = compile("fn helper(x: f64) -> f64 { return x; }", no_f64).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BackendError>(),
        Some(&BackendError::UnsupportedCapability(Capability::Float64))
    );
    let module = decode(&compile("fn helper(x: f64) -> f64 { return x; }", SpirvWriterOptions::default()).unwrap()).unwrap();
    let capabilities = module
        .instrs
        .iter()
        .filter(|x| x.op == Some(Op::Capability))
        .map(|x| x.operands[0])
        .collect::<Vec<_>>();
    assert_eq!(capabilities, [Capability::Shader as u32, Capability::Float64 as u32]);
}

#[test]
fn test_types_are_deduplicated() {
    const SOURCE: &str = r#"
fn helper(a: vec3[f32], b: vec3[f32]) -> f32
{
    let c = a + b;
    return dot(c, vec3[f32](1.0, 1.0, 1.0)) + 1.0;
}
"#;
    let module = decoded(SOURCE);
    assert_eq!(module.count(Op::TypeFloat), 1);
    assert_eq!(module.count(Op::TypeVector), 1);
    assert_eq!(module.count(Op::Dot), 1);
    let constants = module.instrs.iter().filter(|x| x.op == Some(Op::Constant)).count();
    assert_eq!(constants, 1);
}

#[test]
fn test_decode_errors() {
    let header = |version, bound, schema| vec![spirv::MAGIC_NUMBER, version, 0, bound, schema];

    assert!(decode(&[]).is_err());
    assert!(decode(&[0x0203_0722, 0x0001_0000, 0, 1, 0]).is_err());
    assert!(decode(&header(0x0002_0000, 1, 0)).is_err());
    assert!(decode(&header(0x0001_0700, 1, 0)).is_err());
    assert!(decode(&header(0x0001_0000, 0, 0)).is_err());
    assert!(decode(&header(0x0001_0000, 1, 1)).is_err());

    let mut zero_count = header(0x0001_0000, 1, 0);
    zero_count.push(Op::Nop as u32);
    assert!(decode(&zero_count).is_err());

    let mut truncated = header(0x0001_0000, 2, 0);
    truncated.extend([(3 << 16) | Op::TypeFloat as u32, 1]);
    let err = decode(&truncated).unwrap_err();
    assert!(err.to_string().contains("truncated"));

    let module = decode(&header(0x0001_0600, 1, 0)).unwrap();
    assert_eq!(module.header.version_numbers(), (1, 6));
    assert!(module.instrs.is_empty());
}

#[test]
fn test_printer() {
    let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0300, 0, 4, 0];
    words.extend([(2 << 16) | Op::Capability as u32, Capability::Shader as u32]);
    words.extend([(3 << 16) | Op::TypeFloat as u32, 1, 32]);
    words.extend([(4 << 16) | Op::TypeVector as u32, 2, 1, 4]);
    words.extend([
        (4 << 16) | Op::Decorate as u32,
        3,
        Decoration::BuiltIn as u32,
        spirv::BuiltIn::Position as u32,
    ]);
    words.extend([(4 << 16) | Op::Name as u32, 1]);
    words.extend(instr::encode_str("main"));

    let out = SpirvPrinter::default().print(&words).unwrap();
    assert_eq!(
        out,
        r#"; SPIR-V
; Version: 1.3
; Generator: 0x00000000
; Bound: 4
; Schema: 0
OpCapability Shader
%1 = OpTypeFloat 32
%2 = OpTypeVector %1 4
OpDecorate %3 BuiltIn Position
OpName %1 "main"
"#
    );

    let settings = PrinterSettings {
        print_header: false,
        print_parameters: false,
    };
    let out = SpirvPrinter::new(settings).print(&words).unwrap();
    assert_eq!(out, "OpCapability\nOpTypeFloat\nOpTypeVector\nOpDecorate\nOpName\n");
}

#[test]
fn test_printer_float_constants() {
    let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, 8, 0];
    words.extend([(3 << 16) | Op::TypeFloat as u32, 1, 32]);
    words.extend([(3 << 16) | Op::TypeFloat as u32, 2, 64]);
    words.extend([(4 << 16) | Op::TypeInt as u32, 3, 32, 1]);
    words.extend([(4 << 16) | Op::Constant as u32, 1, 4, 1.0f32.to_bits()]);
    words.extend([(4 << 16) | Op::Constant as u32, 1, 5, (-2.5f32).to_bits()]);
    let bits = 0.125f64.to_bits();
    words.extend([(5 << 16) | Op::Constant as u32, 2, 6, bits as u32, (bits >> 32) as u32]);
    words.extend([(4 << 16) | Op::Constant as u32, 3, 7, 7]);

    let settings = PrinterSettings {
        print_header: false,
        print_parameters: true,
    };
    let out = SpirvPrinter::new(settings).print(&words).unwrap();
    assert_eq!(
        out,
        r#"%1 = OpTypeFloat 32
%2 = OpTypeFloat 64
%3 = OpTypeInt 32 1
%4 = OpConstant %1 1.0
%5 = OpConstant %1 -2.5
%6 = OpConstant %2 0.125
%7 = OpConstant %3 7
"#
    );

    let words = compile(BRANCH, SpirvWriterOptions::default()).unwrap();
    let out = SpirvPrinter::default().print(&words).unwrap();
    assert!(out.lines().any(|x| x.contains("= OpConstant %") && x.ends_with(" 1.0")));
    assert!(!out.contains(&format!(" {}\n", 1.0f32.to_bits())));
}

#[test]
fn test_printer_on_generated_module() {
    let words = compile(BRANCH, SpirvWriterOptions::default()).unwrap();
    let out = SpirvPrinter::default().print(&words).unwrap();
    assert!(out.contains("\nOpCapability Shader\n"));
    assert!(out.contains("\nOpMemoryModel Logical GLSL450\n"));
    assert!(out.contains("OpSelectionMerge"));
    assert!(out.lines().any(|x| x.starts_with("OpEntryPoint Fragment %") && x.contains("\"main\"")));
    assert!(out.lines().any(|x| x.starts_with("OpExecutionMode %") && x.ends_with(" OriginUpperLeft")));
    assert!(out.contains("OpDecorate %") && out.contains(" Location 0\n"));
}
