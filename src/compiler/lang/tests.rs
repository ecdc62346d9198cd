use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::syn::parse_source;

fn print(module: &Module) -> String {
    LangWriter::new().generate(module)
}

fn assert_round_trip(source: &str) {
    let module = parse_source(source).unwrap();
    let printed = print(&module);
    let reparsed = parse_source(&printed).unwrap();
    assert_eq!(reparsed, module);
    // Printing is stable once normalized.
    assert_eq!(print(&reparsed), printed);
}

#[test]
fn test_print_branch_module() {
    let module = parse_source(
        r#"
[nzsl_version("1.0")]
module;

struct Data { value: f32 }

external
{
    [set(0), binding(0)] data: uniform[Data]
}

struct Output { [location(0)] value: vec4[f32] }

[entry(frag)]
fn main() -> Output
{
    let value: f32;
    if (data.value > 0.0) value = 1.0; else value = 0.0;
    let output: Output;
    output.value = vec4[f32](value, value, value, 1.0);
    return output;
}
"#,
    )
    .unwrap();

    assert_eq!(
        print(&module),
        r#"[nzsl_version("1.0")]
module;

struct Data
{
	value: f32
}

external
{
	[set(0), binding(0)] data: uniform[Data]
}

struct Output
{
	[location(0)] value: vec4[f32]
}

[entry(frag)]
fn main() -> Output
{
	let value: f32;
	if (data.value > 0.0)
	{
		value = 1.0;
	}
	else
	{
		value = 0.0;
	}
	let output: Output;
	output.value = vec4[f32](value, value, value, 1.0);
	return output;
}

"#
    );
}

#[test]
fn test_round_trip_declarations() {
    assert_round_trip(
        r#"
[nzsl_version("1.0")]
[author("Lynix"), desc("Round \"trip\"")]
[uuid("ad3aed6e-0619-4a26-b5ce-abc2ec0836c4")]
module Engine.Test;

import Engine.Common;

option UseFog: bool;
option UseShadows: bool = !false;
const Scale: f32 = 2.5;

[export, layout(std430)]
struct Particle
{
    position: vec3[f32],
    [cond(UseFog)] fog: f32,
    colors: array[vec4[f32], 4],
    transform: mat4[f32]
}

[set(1)]
external
{
    [binding(0)] particles: storage[Particle],
    [binding(1)] tex: sampler2D[f32]
}

alias P = Particle;

[cond(UseFog)]
fn fog(x: f32) -> f32
{
    return exp(-x * Scale);
}

[entry(compute), workgroup(8, 8, 1)]
fn main()
{
    let p = particles.position.xyz;
    let c = const_select(UseFog, 1.0, 0.0);
    let s = -(p.x + p.y) * (1.0 - c);
    const if (UseFog)
    {
        s *= fog(s);
    }
    else if (!UseFog && s >= 0.0)
    {
        s /= 2.0;
    }
    {
        let inner = max(s, 0.5e-3);
    }
    struct Local { value: f32, count: u32 }
    alias L = Local;
    const Half = 0.5;
    let l: L;
    l.value = s * Half;
}
"#,
    );
}

#[test]
fn test_round_trip_nested_modules() {
    assert_round_trip(
        r#"
[nzsl_version("1.0")]
module;

[nzsl_version("1.0")]
[uuid("ad3aed6e-0619-4a26-b5ce-abc2ec0836c4")]
module _181c45e9
{
    [export, layout(std140)]
    struct Data { value: f32 }
}

alias Data = _181c45e9.Data;

external
{
    [set(0), binding(0)] block: uniform[_181c45e9.Data]
}
"#,
    );
}

#[test]
fn test_constant_printing() {
    assert_eq!(constant_to_string(&ConstantValue::F32(1.0)), "1.0");
    assert_eq!(constant_to_string(&ConstantValue::F32(-0.5)), "(-0.5)");
    assert_eq!(constant_to_string(&ConstantValue::I32(-3)), "(-3)");
    assert_eq!(constant_to_string(&ConstantValue::U32(3)), "u32(3)");
    assert_eq!(
        constant_to_string(&ConstantValue::Vector(vec![ConstantValue::F32(1.0), ConstantValue::F32(2.0)])),
        "vec2[f32](1.0, 2.0)"
    );
}
