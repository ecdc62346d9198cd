use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::common::fnv1a_32;
use crate::compiler::module::{expand_imports, MemoryModuleResolver};
use crate::compiler::opt::{optimize, OptionSet};
use crate::compiler::sema::analyze;
use crate::compiler::syn::parse_source;

fn source(body: &str) -> String {
    format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body)
}

fn lower(module: &Module, env: GlslEnvironment, stage: Option<ShaderStage>) -> Result<String> {
    let analysis = analyze(module)?;
    let module = optimize(module, &analysis, OptionSet::new())?;
    let analysis = analyze(&module)?;
    GlslWriter::new(env).generate(&module, &analysis, stage)
}

fn glsl(body: &str, env: GlslEnvironment, stage: Option<ShaderStage>) -> Result<String> {
    let module = parse_source(&source(body))?;
    lower(&module, env, stage)
}

#[test]
fn test_glsl_versions() {
    let env = |major, minor, es| GlslEnvironment {
        gl_major_version: major,
        gl_minor_version: minor,
        gl_es: es,
        flip_y_position: false,
    };
    assert_eq!(env(3, 3, false).glsl_version().unwrap(), 330);
    assert_eq!(env(4, 6, false).glsl_version().unwrap(), 460);
    assert_eq!(env(3, 2, false).glsl_version().unwrap(), 150);
    assert_eq!(env(3, 0, false).glsl_version().unwrap(), 130);
    assert_eq!(env(2, 0, false).glsl_version().unwrap(), 110);
    assert_eq!(env(3, 1, true).glsl_version().unwrap(), 310);
    assert_eq!(env(2, 0, true).glsl_version().unwrap(), 100);
    assert!(env(1, 5, false).glsl_version().is_err());
}

#[test]
fn test_branch_in_fragment_entry() {
    const SOURCE: &str = r#"
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
    let out = glsl(SOURCE, GlslEnvironment::default(), Some(ShaderStage::Fragment)).unwrap();
    assert_eq!(
        out.trim(),
        r#"
#version 330

struct Data
{
	float value;
};

layout(std140) uniform _NzBinding_data
{
	float value;
} data;

struct FragOut
{
	float value;
};

/*************** Outputs ***************/
layout(location = 0) out float _NzOut_value;

void main()
{
	float value;
	if (data.value > 0.000000)
	{
		value = 1.000000;
	}
	else
	{
		value = 0.000000;
	}
	FragOut output_;
	output_.value = value;
	_NzOut_value = output_.value;
	return;
}
"#
        .trim()
    );
}

#[test]
fn test_imported_declarations_are_renamed() {
    const MODULE: &str = r#"
[nzsl_version("1.0")]
module SimpleModule;

[export]
struct Data { value: f32 }

[export]
struct Unused { value: f32 }

[export]
fn GetValue(data: Data) -> f32
{
    return data.value;
}
"#;
    const MAIN: &str = r#"
import SimpleModule;

struct Block { data: Data }

external
{
    [set(0), binding(0)] block: uniform[Block]
}

struct Input { [location(0)] value: f32 }
struct Output { [location(0)] value: f32 }

[entry(frag)]
fn main(input: Input) -> Output
{
    let output: Output;
    output.value = GetValue(block.data) * input.value;
    return output;
}
"#;
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_source("SimpleModule", MODULE);
    let module = parse_source(&source(MAIN)).unwrap();
    let module = expand_imports(&module, &mut resolver).unwrap();
    let out = lower(&module, GlslEnvironment::default(), None).unwrap();

    let id = format!("_{:08x}", fnv1a_32(b"SimpleModule"));
    let expected = r#"
#version 330

// Module @

struct Data@
{
	float value;
};

float GetValue@(Data@ data)
{
	return data.value;
}

// Main file

struct Block
{
	Data@ data;
};

layout(std140) uniform _NzBinding_block
{
	Data@ data;
} block;

struct Input
{
	float value;
};

struct Output
{
	float value;
};

/**************** Inputs ****************/
layout(location = 0) in float _NzIn_value;

/*************** Outputs ***************/
layout(location = 0) out float _NzOut_value;

void main()
{
	Input input_;
	input_.value = _NzIn_value;

	Output output_;
	output_.value = GetValue@(block.data) * input_.value;
	_NzOut_value = output_.value;
	return;
}
"#
    .trim()
    .replace('@', &id);
    assert_eq!(out.trim(), expected);
}

#[test]
fn test_vertex_builtins_and_flip_y() {
    const SOURCE: &str = r#"
struct VertIn { [location(0)] pos: vec3[f32] }
struct VertOut { [builtin(position)] position: vec4[f32] }

[entry(vert)]
fn main(input: VertIn) -> VertOut
{
    let output: VertOut;
    output.position = vec4[f32](input.pos.x, input.pos.y, input.pos.z, 1.0);
    return output;
}
"#;
    let env = GlslEnvironment {
        gl_major_version: 3,
        gl_minor_version: 0,
        gl_es: true,
        flip_y_position: true,
    };
    let out = glsl(SOURCE, env, Some(ShaderStage::Vertex)).unwrap();
    assert!(out.starts_with("#version 300 es\n\n#if GL_FRAGMENT_PRECISION_HIGH\nprecision highp float;\n"));
    assert!(out.contains("layout(location = 0) in vec3 _NzIn_pos;"));
    assert!(out.contains("uniform float _NzFlipYValue;"));
    assert!(out.contains("\toutput_.position = vec4(input_.pos.x, input_.pos.y, input_.pos.z, 1.000000);\n"));
    assert!(out.contains("\tgl_Position = output_.position * vec4(1.0, _NzFlipYValue, 1.0, 1.0);\n\treturn;\n"));
    assert!(!out.contains("_NzOut_"));
    // Every output is a builtin, so there is no output section.
    assert!(!out.contains("Outputs"));
    assert!(out.contains("/**************** Inputs ****************/\n"));
}

#[test]
fn test_stage_selection() {
    const SOURCE: &str = r#"
struct FragOut { [location(0)] color: vec4[f32] }
struct VertOut { [builtin(position)] position: vec4[f32] }

[entry(frag)]
fn fs() -> FragOut
{
    let output: FragOut;
    output.color = vec4[f32](1.0, 1.0, 1.0, 1.0);
    return output;
}

[entry(vert)]
fn vs() -> VertOut
{
    let output: VertOut;
    output.position = vec4[f32](0.0, 0.0, 0.0, 1.0);
    return output;
}
"#;
    let err = glsl(SOURCE, GlslEnvironment::default(), None).unwrap_err();
    assert!(err.to_string().contains("multiple entry points"));

    let out = glsl(SOURCE, GlslEnvironment::default(), Some(ShaderStage::Vertex)).unwrap();
    assert!(out.contains("gl_Position = output_.position;"));
    assert!(!out.contains("struct FragOut"));
    assert!(!out.contains("_NzOut_color"));

    let err = glsl(SOURCE, GlslEnvironment::default(), Some(ShaderStage::Compute)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BackendError>(),
        Some(&BackendError::MissingEntry("compute".to_string()))
    );
}

#[test]
fn test_unreachable_declarations_are_pruned() {
    const SOURCE: &str = r#"
struct Unused { value: f32 }
struct Used { value: f32 }
struct Output { [location(0)] color: vec4[f32] }

external
{
    [set(0), binding(0)] used: uniform[Used],
    [set(0), binding(1)] unused: uniform[Unused]
}

fn helper() -> f32 { return 1.0; }
fn orphan(x: Unused) -> f32 { return x.value; }

[entry(frag)]
fn main() -> Output
{
    let output: Output;
    output.color = vec4[f32](used.value, helper(), 0.0, 1.0);
    return output;
}
"#;
    let out = glsl(SOURCE, GlslEnvironment::default(), None).unwrap();
    assert!(out.contains("struct Used\n"));
    assert!(out.contains("uniform _NzBinding_used\n"));
    assert!(out.contains("float helper()\n"));
    assert!(!out.contains("Unused"));
    assert!(!out.contains("orphan"));
    assert!(!out.contains("_NzBinding_unused"));
}

#[test]
fn test_unsupported_features() {
    let es = GlslEnvironment {
        gl_major_version: 3,
        gl_minor_version: 0,
        gl_es: true,
        flip_y_position: false,
    };
    let err = glsl("fn helper(x: f64) -> f64 { return x; }", es.clone(), None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BackendError>(),
        Some(&BackendError::UnsupportedGlslFeature("300 es".to_string(), "f64"))
    );

    const COMPUTE: &str = r#"
struct Input { [builtin(global_invocation_indices)] id: vec3[u32] }

[entry(compute), workgroup(8, 8, 1)]
fn main(input: Input) {}
"#;
    let err = glsl(COMPUTE, es, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BackendError>(),
        Some(&BackendError::UnsupportedGlslFeature("300 es".to_string(), "compute shaders"))
    );
    let gl43 = GlslEnvironment {
        gl_major_version: 4,
        gl_minor_version: 3,
        ..GlslEnvironment::default()
    };
    let out = glsl(COMPUTE, gl43, None).unwrap();
    assert!(out.contains("layout(local_size_x = 8, local_size_y = 8, local_size_z = 1) in;"));
    assert!(out.contains("\tinput_.id = gl_GlobalInvocationID;\n"));
    assert!(!out.contains("Inputs"));
}

#[test]
fn test_expressions() {
    const SOURCE: &str = r#"
fn helper(input: f32) -> vec3[f32]
{
    let a = lerp(input, 2.0, 0.5);
    let b = -a * (a + 1.0);
    let c = a.xxx;
    let n = u32(3);
    let m = -2;
    return c * b;
}
"#;
    let out = glsl(SOURCE, GlslEnvironment::default(), None).unwrap();
    assert!(out.contains("vec3 helper(float input_)\n{\n"));
    assert!(out.contains("\tfloat a = mix(input_, 2.000000, 0.500000);\n"));
    assert!(out.contains("\tfloat b = (-a) * (a + 1.000000);\n"));
    assert!(out.contains("\tvec3 c = vec3(a);\n"));
    assert!(out.contains("\tuint n = 3u;\n"));
    assert!(out.contains("\tint m = (-2);\n"));
    assert!(out.contains("\treturn c * b;\n"));
}
