use pretty_assertions::assert_eq;
use spirv::Op;

use crate::compiler::ast::ShaderStage;
use crate::compiler::error::CompileError;
use crate::compiler::module::MemoryModuleResolver;
use crate::compiler::spirv::decode;
use crate::compiler::{CompileOptions, Compiler, Output, OutputFormat};

fn compile(body: &str, options: CompileOptions) -> anyhow::Result<Output> {
    let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
    Compiler::new(options).compile(&source)
}

fn options(format: OutputFormat, stage: Option<ShaderStage>) -> CompileOptions {
    CompileOptions {
        format,
        stage,
        ..CompileOptions::default()
    }
}

fn text(out: Output) -> String {
    out.as_text().unwrap().to_string()
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
fn test_compile_compute_spirv_asm() {
    const SOURCE: &str = r#"
struct Input { [builtin(global_invocation_indices)] id: vec3[u32] }

[entry(compute), workgroup(1, 1, 1)]
fn main(input: Input) {}
"#;
    let out = compile(SOURCE, options(OutputFormat::SpirvAsm, None)).unwrap();
    assert_eq!(
        text(out),
        r#"; SPIR-V
; Version: 1.0
; Generator: 0x00000000
; Bound: 17
; Schema: 0
OpCapability Shader
OpMemoryModel Logical GLSL450
OpEntryPoint GLCompute %1 "main" %11
OpExecutionMode %1 LocalSize 1 1 1
OpName %1 "main"
OpName %7 "Input"
OpMemberName %7 0 "id"
OpName %9 "input"
OpName %11 "id"
OpMemberDecorate %7 0 Offset 0
OpDecorate %11 BuiltIn GlobalInvocationId
%2 = OpTypeVoid
%3 = OpTypeFunction %2
%5 = OpTypeInt 32 0
%6 = OpTypeVector %5 3
%7 = OpTypeStruct %6
%8 = OpTypePointer Function %7
%10 = OpTypePointer Input %6
%11 = OpVariable %10 Input
%13 = OpTypePointer Function %6
%14 = OpTypeInt 32 1
%15 = OpConstant %14 0
%1 = OpFunction %2 None %3
%4 = OpLabel
%9 = OpVariable %8 Function
%12 = OpLoad %6 %11
%16 = OpAccessChain %13 %9 %15
OpStore %16 %12
OpReturn
OpFunctionEnd
"#
    );
}

#[test]
fn test_branch_to_glsl_and_spirv() {
    let out = compile(BRANCH, options(OutputFormat::Glsl, Some(ShaderStage::Fragment))).unwrap();
    let glsl = text(out);
    assert!(glsl.starts_with("#version 330\n"));
    assert!(glsl.contains("\tif (data.value > 0.000000)\n\t{\n\t\tvalue = 1.000000;\n\t}\n\telse\n\t{\n\t\tvalue = 0.000000;\n\t}\n"));

    let out = compile(BRANCH, options(OutputFormat::Spirv, Some(ShaderStage::Fragment))).unwrap();
    let module = decode(out.as_words().unwrap()).unwrap();
    assert_eq!(module.count(Op::SelectionMerge), 1);
    assert_eq!(module.count(Op::BranchConditional), 1);
    assert_eq!(module.count(Op::Branch), 2);
    assert_eq!(module.count(Op::EntryPoint), 1);

    let bytes = out.to_bytes();
    assert_eq!(bytes.len(), out.as_words().unwrap().len() * 4);
    assert_eq!(bytes[..4], spirv::MAGIC_NUMBER.to_le_bytes());
}

#[test]
fn test_discard_in_branch() {
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
    let out = compile(SOURCE, options(OutputFormat::Spirv, None)).unwrap();
    let module = decode(out.as_words().unwrap()).unwrap();
    assert_eq!(module.count(Op::SelectionMerge), 1);
    assert_eq!(module.count(Op::Kill), 1);
    assert_eq!(module.count(Op::Return), 1);

    let out = compile(SOURCE, options(OutputFormat::Glsl, None)).unwrap();
    assert!(text(out).contains("\tif (input_.value < 0.000000)\n\t{\n\t\tdiscard;\n\t}\n"));

    // Discarding is only allowed from fragment entries.
    const VERTEX: &str = r#"
struct Output { [builtin(position)] position: vec4[f32] }

[entry(vert)]
fn main() -> Output
{
    discard;
}
"#;
    let err = compile(VERTEX, options(OutputFormat::Spirv, None)).unwrap_err();
    assert!(err.downcast_ref::<CompileError>().is_some());
}

#[test]
fn test_options_select_code() {
    const SOURCE: &str = r#"
option UseRed: bool;

struct Output { [location(0)] color: vec4[f32] }

[entry(frag)]
fn main() -> Output
{
    let red = const_select(UseRed, 1.0, 0.0);
    let output: Output;
    output.color = vec4[f32](red, 0.0, 0.0, 1.0);
    return output;
}
"#;
    let disabled = text(compile(SOURCE, options(OutputFormat::Glsl, None)).unwrap());
    assert!(disabled.contains("\tfloat red = 0.000000;\n"));

    let enabled = CompileOptions {
        options: vec!["UseRed".to_string()],
        ..options(OutputFormat::Glsl, None)
    };
    let enabled = text(compile(SOURCE, enabled).unwrap());
    assert!(enabled.contains("\tfloat red = 1.000000;\n"));

    let unknown = CompileOptions {
        options: vec!["UseBlue".to_string()],
        ..options(OutputFormat::Glsl, None)
    };
    let err = compile(SOURCE, unknown).unwrap_err();
    assert!(err.to_string().contains("unknown option UseBlue"));
}

#[test]
fn test_alias_transparency() {
    const SOURCE: &str = r#"
alias Color = vec4[f32];
alias Out = Output;

struct Output { [location(0)] color: Color }

[entry(frag)]
fn main() -> Out
{
    let c: Color = vec4[f32](1.0, 1.0, 1.0, 1.0);
    let output: Out;
    output.color = c;
    return output;
}
"#;
    let glsl = text(compile(SOURCE, options(OutputFormat::Glsl, None)).unwrap());
    assert!(glsl.contains("layout(location = 0) out vec4 _NzOut_color;"));
    assert!(glsl.contains("\tvec4 c = "));
    assert!(glsl.contains("\tOutput output_;\n"));
    assert!(!glsl.contains("Color"));

    let out = compile(SOURCE, options(OutputFormat::Spirv, None)).unwrap();
    let module = decode(out.as_words().unwrap()).unwrap();
    assert_eq!(module.count(Op::TypeStruct), 1);
}

#[test]
fn test_imported_module() {
    const MODULE: &str = r#"
[nzsl_version("1.0")]
module Shared.Math;

[export]
fn Scale(value: f32) -> f32
{
    return value * 2.0;
}
"#;
    const SOURCE: &str = r#"
import Shared.Math;

struct Input { [location(0)] value: f32 }
struct Output { [location(0)] value: f32 }

[entry(frag)]
fn main(input: Input) -> Output
{
    let output: Output;
    output.value = Scale(input.value);
    return output;
}
"#;
    let resolver = || {
        let mut resolver = MemoryModuleResolver::new();
        resolver.register_source("Shared.Math", MODULE);
        resolver
    };
    let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", SOURCE);

    let mut compiler = Compiler::new(options(OutputFormat::Spirv, None)).with_resolver(resolver());
    let out = compiler.compile(&source).unwrap();
    let module = decode(out.as_words().unwrap()).unwrap();
    assert_eq!(module.count(Op::Function), 2);
    assert_eq!(module.count(Op::FunctionCall), 1);

    compiler.options_mut().format = OutputFormat::Nzsl;
    let nzsl = text(compiler.compile(&source).unwrap());
    // Printed output is itself a complete module.
    let mut reprint = Compiler::new(options(OutputFormat::Nzsl, None));
    assert_eq!(text(reprint.compile(&nzsl).unwrap()), nzsl);

    let err = compile(SOURCE, options(OutputFormat::Spirv, None)).unwrap_err();
    assert!(err.to_string().contains("Shared.Math"));
}

const OPTION_SOURCE: &str = r#"
option UseRed: bool;

struct Output { [location(0)] color: vec4[f32] }

[entry(frag)]
fn main() -> Output
{
    let red = const_select(UseRed, 1.0, 0.0);
    let output: Output;
    output.color = vec4[f32](red, 0.0, 0.0, 1.0);
    return output;
}
"#;

#[test]
fn test_binary_module_compiles_like_source() {
    let binary = compile(OPTION_SOURCE, options(OutputFormat::NzslBinary, None)).unwrap();
    let Output::NzslBinary(bytes) = &binary else {
        panic!("unexpected {:?}", binary);
    };
    assert_eq!(binary.as_text(), None);
    assert_eq!(&binary.to_bytes(), bytes);

    let direct = text(compile(OPTION_SOURCE, options(OutputFormat::Glsl, None)).unwrap());
    let mut compiler = Compiler::new(options(OutputFormat::Glsl, None));
    assert_eq!(text(compiler.compile_binary(bytes).unwrap()), direct);

    let err = compiler.compile_binary(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(err.to_string().starts_with("unexpected end of nzslb data"));
}

#[test]
fn test_partial_compilation_keeps_options() {
    let partial = |format| CompileOptions {
        partial: true,
        ..options(format, None)
    };
    let nzsl = text(compile(OPTION_SOURCE, partial(OutputFormat::Nzsl)).unwrap());
    assert!(nzsl.contains("option UseRed: bool;"));
    assert!(nzsl.contains("const_select(UseRed, 1.0, 0.0)"));

    let Output::NzslBinary(bytes) = compile(OPTION_SOURCE, partial(OutputFormat::NzslBinary)).unwrap() else {
        panic!("expected a binary module");
    };
    // Options are picked when the stored module is compiled.
    let enabled = CompileOptions {
        options: vec!["UseRed".to_string()],
        ..options(OutputFormat::Glsl, None)
    };
    let glsl = text(Compiler::new(enabled).compile_binary(&bytes).unwrap());
    assert!(glsl.contains("\tfloat red = 1.000000;\n"));
    let glsl = text(Compiler::new(options(OutputFormat::Glsl, None)).compile_binary(&bytes).unwrap());
    assert!(glsl.contains("\tfloat red = 0.000000;\n"));

    let err = compile(OPTION_SOURCE, partial(OutputFormat::Glsl)).unwrap_err();
    assert_eq!(err.to_string(), "partial compilation cannot produce Glsl output");
    // Partial output is still checked.
    let err = compile("fn f() { let x: f32 = true; }", partial(OutputFormat::Nzsl)).unwrap_err();
    assert!(err.downcast_ref::<CompileError>().is_some());
}

#[test]
fn test_header_output() {
    assert_eq!(Output::NzslBinary(vec![0x52, 0, 255]).to_header(), "82,0,255");
    assert_eq!(Output::Spirv(vec![0x0723_0203]).to_header(), "3,2,35,7");
    assert_eq!(Output::Nzsl("ab".to_string()).to_header(), "97,98");
}

#[test]
fn test_infinite_constants_are_not_emitted() {
    const SOURCE: &str = r#"
struct Output { [location(0)] value: f32 }

[entry(frag)]
fn main() -> Output
{
    let output: Output;
    output.value = 3e38 * 10.0;
    return output;
}
"#;
    let glsl = text(compile(SOURCE, options(OutputFormat::Glsl, None)).unwrap());
    assert!(!glsl.contains("inf"));
    let nzsl = text(compile(SOURCE, options(OutputFormat::Nzsl, None)).unwrap());
    assert!(!nzsl.contains("inf"));
    assert!(nzsl.contains(" * 10.0"));
}
