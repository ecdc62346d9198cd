use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::opt::{optimize, OptionSet};
use crate::compiler::sema::analyze;
use crate::compiler::syn::parse_source;

fn parse(body: &str) -> Module {
    let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
    parse_source(&source).unwrap()
}

fn check(body: &str, stages: &[ShaderStage]) -> Result<()> {
    let module = parse(body);
    let analysis = analyze(&module)?;
    let module = optimize(&module, &analysis, OptionSet::new())?;
    let analysis = analyze(&module)?;
    let options = ValidationOptions {
        stages: stages.to_vec(),
    };
    validate(&module, &analysis, &options)
}

fn check_err(body: &str, stages: &[ShaderStage]) -> String {
    match check(body, stages) {
        Ok(()) => panic!("validation should fail"),
        Err(e) => e.downcast_ref::<CompileError>().unwrap().message.clone(),
    }
}

const FRAGMENT: &str = r#"
struct Data { value: f32 }

external
{
    [set(0), binding(0)] data: uniform[Data]
}

struct FragOut
{
    [location(0)] color: vec4[f32]
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
    output.color = vec4[f32](value, value, value, 1.0);
    output.color.xy = vec2[f32](0.0, 0.0);
    return output;
}
"#;

#[test]
fn test_valid_fragment_shader() {
    check(FRAGMENT, &[ShaderStage::Fragment]).unwrap();
}

#[test]
fn test_missing_requested_stage() {
    assert_eq!(
        check_err(FRAGMENT, &[ShaderStage::Fragment, ShaderStage::Vertex]),
        "no entry point for stage vert"
    );
}

#[test]
fn test_multiple_entries_for_a_stage() {
    let msg = check_err("[entry(frag)] fn a() {}\n[entry(frag)] fn b() {}", &[]);
    assert_eq!(msg, "multiple frag entry points: a and b");
}

#[test]
fn test_assignment_targets() {
    assert_eq!(check_err("const K = 1;\nfn main() { K = 2; }", &[]), "cannot assign to const K");
    assert_eq!(check_err("option A: bool;\nfn main() { A = true; }", &[]), "cannot assign to option A");
    assert_eq!(
        check_err("fn main() { let v = vec2[f32](1.0, 2.0); v.xx = vec2[f32](1.0, 1.0); }", &[]),
        "swizzle with repeated components is not assignable"
    );
    assert_eq!(
        check_err("fn main() { let x = 1.0; x + 1.0 = 2.0; }", &[]),
        "expression is not assignable"
    );
    assert_eq!(
        check_err(
            "struct Data { value: f32 }\nexternal { [binding(0)] data: uniform[Data] }\nfn main() { data.value = 1.0; }",
            &[]
        ),
        "uniform blocks are read-only"
    );
    check(
        "struct Data { value: f32 }\nexternal { [binding(0)] data: storage[Data] }\nfn main() { data.value = 1.0; }",
        &[],
    )
    .unwrap();
}

#[test]
fn test_discard_reachability() {
    const SOURCE: &str = r#"
fn helper() { discard; }

[entry(vert)]
fn main() { helper(); }
"#;
    assert_eq!(
        check_err(SOURCE, &[]),
        "discard is only allowed in fragment stage, helper is reachable from vert entry main"
    );
    check("fn helper() { discard; }\n[entry(frag)] fn main() { helper(); }", &[]).unwrap();
}

#[test]
fn test_recursion_is_rejected() {
    let msg = check_err("fn a() { b(); }\nfn b() { a(); }", &[]);
    assert_eq!(msg, "function a is recursive");
}

#[test]
fn test_entry_io_contracts() {
    assert_eq!(
        check_err("struct In { value: f32 }\n[entry(frag)] fn main(input: In) {}", &[]),
        "field value of In needs a location or a builtin"
    );
    assert_eq!(
        check_err("struct In { [builtin(position)] pos: vec4[f32] }\n[entry(frag)] fn main(input: In) {}", &[]),
        "builtin position is a vert output, it cannot be used as a frag input"
    );
    assert_eq!(
        check_err("struct Out { [builtin(frag_depth)] depth: f32 }\n[entry(frag)] fn main() -> Out { let o: Out; return o; }", &[]),
        "frag_depth requires the depth_write attribute on entry main"
    );
    check(
        "struct Out { [builtin(frag_depth)] depth: f32 }\n[entry(frag), depth_write(replace)] fn main() -> Out { let o: Out; return o; }",
        &[],
    )
    .unwrap();
    assert_eq!(
        check_err("[entry(compute)] fn main() {}", &[]),
        "compute entry main requires the workgroup attribute"
    );
    check(
        "struct In { [builtin(global_invocation_indices)] id: vec3[u32] }\n[entry(compute), workgroup(8, 8, 1)] fn main(input: In) {}",
        &[ShaderStage::Compute],
    )
    .unwrap();
}

#[test]
fn test_bindings() {
    assert_eq!(
        check_err("struct Data { value: f32 }\nexternal { data: uniform[Data] }", &[]),
        "external data requires a binding"
    );
    assert_eq!(
        check_err(
            "struct Data { value: f32 }\nexternal { [binding(0)] a: uniform[Data], [binding(0)] b: uniform[Data] }",
            &[]
        ),
        "set 0 binding 0 is used by both a and b"
    );
    check(
        "struct Data { value: f32 }\nexternal { [binding(0)] a: uniform[Data], [set(1), binding(0)] b: uniform[Data] }",
        &[],
    )
    .unwrap();
    assert_eq!(
        check_err(
            "struct Data { values: array[vec4[f32], 1000000000] }\nexternal { [binding(0)] data: uniform[Data] }",
            &[]
        ),
        "array[vec4[f32], 1000000000] is too large to be laid out in memory"
    );
}

#[test]
fn test_unresolved_compile_time_constructs() {
    let module = parse("option A: bool;\nfn main() { const if (A) { discard; } }");
    let analysis = analyze(&module).unwrap();
    let err = validate(&module, &analysis, &ValidationOptions::default()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<CompileError>().unwrap().message,
        "const if must be resolved before validation"
    );
}
