use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::common::PrimitiveType;
use crate::compiler::sema::analyze;
use crate::compiler::syn::parse_source;

fn parse(body: &str) -> Module {
    let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
    parse_source(&source).unwrap()
}

fn optimized(body: &str, enabled: &[&str]) -> Module {
    let module = parse(body);
    let analysis = analyze(&module).unwrap();
    let options = OptionSet::from_names(&analysis, enabled).unwrap();
    optimize(&module, &analysis, options).unwrap()
}

fn main_body(module: &Module) -> &[Statement] {
    module
        .statements
        .iter()
        .find_map(|x| match &x.kind {
            StatementKind::DeclareFunction(f) if f.name == "main" => Some(f.body.as_slice()),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_integer_folding_wraps() {
    use ConstantValue as C;
    assert_eq!(C::I32(i32::MAX).binary(BinaryOp::Add, &C::I32(1)), Some(C::I32(i32::MIN)));
    assert_eq!(C::I32(i32::MIN).binary(BinaryOp::Divide, &C::I32(-1)), Some(C::I32(i32::MIN)));
    assert_eq!(C::U32(0).binary(BinaryOp::Subtract, &C::U32(1)), Some(C::U32(u32::MAX)));
    assert_eq!(C::I32(7).binary(BinaryOp::Divide, &C::I32(2)), Some(C::I32(3)));
    assert_eq!(C::I32(1).binary(BinaryOp::Divide, &C::I32(0)), None);
    assert_eq!(C::F32(1.0).binary(BinaryOp::Divide, &C::F32(0.0)), None);
    assert_eq!(C::F32(3e38).binary(BinaryOp::Multiply, &C::F32(10.0)), None);
    assert_eq!(C::F64(f64::MAX).binary(BinaryOp::Add, &C::F64(f64::MAX)), None);
    assert_eq!(C::F64(1e300).convert(PrimitiveType::F32), None);
    assert_eq!(C::I32(i32::MIN).unary(UnaryOp::Minus), Some(C::I32(i32::MIN)));
}

#[test]
fn test_vector_folding() {
    use ConstantValue as C;
    let v = C::Vector(vec![C::F32(1.0), C::F32(2.0)]);
    assert_eq!(
        v.binary(BinaryOp::Multiply, &C::F32(2.0)),
        Some(C::Vector(vec![C::F32(2.0), C::F32(4.0)]))
    );
    assert_eq!(v.swizzle(&[1, 0, 0]), Some(C::Vector(vec![C::F32(2.0), C::F32(1.0), C::F32(1.0)])));
    assert_eq!(v.swizzle(&[1]), Some(C::F32(2.0)));
    assert_eq!(
        fold::cast(
            &TypeExpr::Vector {
                base: PrimitiveType::F32,
                count: 3
            },
            &[C::I32(1)]
        ),
        Some(C::Vector(vec![C::F32(1.0); 3]))
    );
}

#[test]
fn test_folds_constants_and_consts() {
    let out = optimized(
        r#"
const Scale = 2.0 * 3.0;

fn main()
{
    let a = Scale + 1.0;
    let b = 1 + 2 * 3 == 7;
    let c = f32(2) / 0.0;
    let d = vec2[f32](1.0, 2.0).y;
}
"#,
        &[],
    );
    let expected = parse(
        r#"
const Scale = 6.0;

fn main()
{
    let a = 7.0;
    let b = true;
    let c = 2.0 / 0.0;
    let d = 2.0;
}
"#,
    );
    assert_eq!(out, expected);
}

#[test]
fn test_non_finite_results_stay_unfolded() {
    const SOURCE: &str = "fn main() { let a = 3e38 * 10.0; let b = 3e38 * 1.0; }";
    let out = optimized(SOURCE, &[]);
    assert_eq!(out, parse("fn main() { let a = 3e38 * 10.0; let b = 3e38; }"));
}

#[test]
fn test_option_branch_elimination() {
    const SOURCE: &str = r#"
option UseFog: bool;

struct Data
{
    value: f32,
    [cond(UseFog)] fog: f32
}

[cond(!UseFog)]
fn unused() {}

fn main()
{
    let value: f32;
    const if (UseFog)
    {
        value = 1.0;
    }
    else
    {
        value = 2.0;
    }
    let x = const_select(UseFog, 3.0, 4.0);
}
"#;
    let enabled = optimized(SOURCE, &["UseFog"]);
    let expected = parse(
        r#"
option UseFog: bool;

struct Data
{
    value: f32,
    fog: f32
}

fn main()
{
    let value: f32;
    {
        value = 1.0;
    }
    let x = 3.0;
}
"#,
    );
    assert_eq!(enabled, expected);

    let disabled = optimized(SOURCE, &[]);
    let expected = parse(
        r#"
option UseFog: bool;

struct Data
{
    value: f32
}

fn unused() {}

fn main()
{
    let value: f32;
    {
        value = 2.0;
    }
    let x = 4.0;
}
"#,
    );
    assert_eq!(disabled, expected);
}

#[test]
fn test_runtime_branch_keeps_undecided_arms() {
    let out = optimized(
        r#"
fn main()
{
    let value = 1.0;
    if (false)
        value = 2.0;
    else if (value > 0.0)
        value = 3.0;
    else if (true)
        value = 4.0;
    else
        value = 5.0;
}
"#,
        &[],
    );
    let expected = parse(
        r#"
fn main()
{
    let value = 1.0;
    if (value > 0.0)
        value = 3.0;
    else
        value = 4.0;
}
"#,
    );
    assert_eq!(out, expected);
}

#[test]
fn test_const_if_requires_constant() {
    let module = parse("fn main() { let x = 1.0; const if (x > 0.0) { x = 2.0; } }");
    let analysis = analyze(&module).unwrap();
    let err = optimize(&module, &analysis, OptionSet::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<CompileError>().unwrap().message,
        "const if condition is not a compile-time constant"
    );
}

#[test]
fn test_vector_member_becomes_swizzle() {
    let out = optimized("fn main() { let v = vec3[f32](1.0, 2.0, 3.0); let w = v.zx; }", &[]);
    match &main_body(&out)[1].kind {
        StatementKind::DeclareVariable(VariableDecl { init: Some(init), .. }) => match &init.kind {
            ExpressionKind::Swizzle { components, .. } => assert_eq!(components, &vec![2, 0]),
            x => panic!("unexpected {:?}", x),
        },
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn test_idempotence() {
    let module = parse(
        r#"
option A: bool;
option B: bool;
const K = 4;

fn helper(x: vec4[f32]) -> f32 { return x.w * f32(K); }

fn main()
{
    let v = vec4[f32](1.0, 2.0, 3.0, 4.0);
    let s = v.xy;
    const if (A && !B)
    {
        s = s * 2.0;
    }
    else if (B)
    {
        s = s.yx;
    }
    if (v.x > 0.0)
    {
        s.x = helper(v) + const_select(B, 1.0, 0.0);
    }
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let options = OptionSet::from_names(&analysis, &["B"]).unwrap();
    let once = optimize(&module, &analysis, options).unwrap();

    let analysis = analyze(&once).unwrap();
    let twice = optimize(&once, &analysis, options).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn test_unknown_option_name() {
    let module = parse("option A: bool;");
    let analysis = analyze(&module).unwrap();
    assert!(OptionSet::from_names(&analysis, &["Missing"]).is_err());
}

#[test]
fn test_option_default_values() {
    const SOURCE: &str = r#"
option UseRed: bool = true;
option UseBlue: bool = false;
option UseGreen: bool;

fn main()
{
    let r = const_select(UseRed, 1.0, 0.0);
    let g = const_select(UseGreen, 1.0, 0.0);
    let b = const_select(UseBlue, 1.0, 0.0);
}
"#;
    let module = parse(SOURCE);
    let analysis = analyze(&module).unwrap();
    let bits = |names: &[&str]| OptionSet::from_names(&analysis, names).unwrap().bits();
    assert_eq!(bits(&[]), 0b001);
    assert_eq!(bits(&["UseRed=false", "UseBlue"]), 0b010);
    assert_eq!(bits(&["UseGreen=true"]), 0b101);
    let err = OptionSet::from_names(&analysis, &["UseRed=maybe"]).unwrap_err();
    assert_eq!(err.to_string(), "invalid value maybe for option UseRed");

    let out = optimized(SOURCE, &[]);
    let expected = parse(
        r#"
option UseRed: bool = true;
option UseBlue: bool = false;
option UseGreen: bool;

fn main()
{
    let r = 1.0;
    let g = 0.0;
    let b = 0.0;
}
"#,
    );
    assert_eq!(out, expected);

    let module = parse(
        r#"
struct Data { value: f32 }
external { [binding(0)] data: uniform[Data] }
option Bright: bool = data.value > 0.0;
"#,
    );
    let analysis = analyze(&module).unwrap();
    let err = OptionSet::defaults(&analysis).unwrap_err();
    assert_eq!(
        err.downcast_ref::<CompileError>().unwrap().message,
        "default value of option Bright is not a compile-time constant"
    );
}
