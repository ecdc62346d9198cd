use pretty_assertions::assert_eq;

use super::layout::{struct_layout, FieldLayout};
use super::*;
use crate::compiler::ast::MemoryLayout;
use crate::compiler::common::PrimitiveType;
use crate::compiler::syn::parse_source;

fn parse(body: &str) -> Module {
    let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
    parse_source(&source).unwrap()
}

fn analyze_err(body: &str) -> String {
    let module = parse(body);
    match analyze(&module) {
        Ok(_) => panic!("analysis should fail"),
        Err(e) => e.downcast_ref::<CompileError>().unwrap().message.clone(),
    }
}

fn find_function<'a>(module: &'a Module, name: &str) -> &'a FunctionDecl {
    module
        .statements
        .iter()
        .find_map(|x| match &x.kind {
            StatementKind::DeclareFunction(f) if f.name == name => Some(f),
            _ => None,
        })
        .unwrap()
}

/// Initializer of the `n`-th statement of `main`, which must be a `let`.
fn let_init(module: &Module, n: usize) -> &Expression {
    match &find_function(module, "main").body[n].kind {
        StatementKind::DeclareVariable(VariableDecl { init: Some(x), .. }) => x,
        x => panic!("unexpected {:?}", x),
    }
}

fn struct_by_name(analysis: &Analysis, name: &str) -> DeclId {
    analysis
        .declarations()
        .iter()
        .position(|x| x.name == name && x.as_struct().is_some())
        .unwrap()
}

#[test]
fn test_scope_stack() {
    let mut scope = ScopeStack::new();
    scope.push();
    scope.define("a", 0, false).unwrap();
    assert_eq!(scope.define("a", 1, false), Err(0));
    scope.push();
    scope.define("a", 2, false).unwrap();
    assert_eq!(scope.lookup("a"), Some(2));
    scope.pop();
    assert_eq!(scope.lookup("a"), Some(0));
    // Conditional variants may share a name.
    scope.define("b", 3, true).unwrap();
    scope.define("b", 4, true).unwrap();
    assert_eq!(scope.lookup("b"), Some(4));
}

#[test]
fn test_unknown_identifier() {
    let msg = analyze_err("fn main() { let x = y; }");
    assert_eq!(msg, "unknown identifier y");
}

#[test]
fn test_redeclaration_in_same_scope() {
    let msg = analyze_err("fn main() { let x = 1; let x = 2; }");
    assert_eq!(msg, "x is already declared as a variable in this scope");
}

#[test]
fn test_shadowing_outer_scope() {
    let module = parse(
        r#"
fn main()
{
    let x = 1;
    {
        let x = 2.0;
        let y = x;
    }
    let z = x;
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let body = &find_function(&module, "main").body;
    let inner = match &body[1].kind {
        StatementKind::Scoped(x) => x,
        x => panic!("unexpected {:?}", x),
    };
    let y = match &inner[1].kind {
        StatementKind::DeclareVariable(x) => x.init.as_ref().unwrap(),
        x => panic!("unexpected {:?}", x),
    };
    assert_eq!(analysis.type_of(y).unwrap(), ExpressionType::Primitive(PrimitiveType::F32));
    assert_eq!(
        analysis.type_of(let_init(&module, 2)).unwrap(),
        ExpressionType::Primitive(PrimitiveType::I32)
    );
}

#[test]
fn test_local_struct_shadows_outer_struct() {
    let module = parse(
        r#"
struct Data { value: f32 }

fn main()
{
    let outer: Data;
    {
        struct Data { value: vec2[f32] }
        alias Pair = Data;
        let inner: Pair;
        let v = inner.value;
    }
    let w = outer.value;
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let body = &find_function(&module, "main").body;
    let inner = match &body[1].kind {
        StatementKind::Scoped(x) => x,
        x => panic!("unexpected {:?}", x),
    };
    let local = match &inner[0].kind {
        StatementKind::DeclareStruct(x) => analysis.struct_id(x).unwrap(),
        x => panic!("unexpected {:?}", x),
    };
    assert!(analysis.decl(local).local);
    assert!(!analysis.decl(struct_by_name(&analysis, "Data")).local);
    assert_ne!(local, struct_by_name(&analysis, "Data"));

    let v = match &inner[3].kind {
        StatementKind::DeclareVariable(x) => x.init.as_ref().unwrap(),
        x => panic!("unexpected {:?}", x),
    };
    assert_eq!(analysis.type_of(v).unwrap(), ExpressionType::Vector(PrimitiveType::F32, 2));
    assert_eq!(
        analysis.type_of(let_init(&module, 2)).unwrap(),
        ExpressionType::Primitive(PrimitiveType::F32)
    );

    let msg = analyze_err("fn main() { let Local = 1; struct Local { x: f32 } }");
    assert_eq!(msg, "Local is already declared as a variable in this scope");
    let msg = analyze_err("fn main() { { struct Local { x: f32 } } let v: Local; }");
    assert_eq!(msg, "unknown identifier Local");
}

#[test]
fn test_recursive_structs_are_rejected() {
    assert_eq!(analyze_err("struct A { b: B }\nstruct B { a: A }"), "struct A contains itself");
    assert_eq!(
        analyze_err("struct Node { value: f32, children: array[Node, 4] }"),
        "struct Node contains itself"
    );
    let module = parse("struct A { b: B, c: B }\nstruct B { value: f32 }");
    assert!(analyze(&module).is_ok());
}

#[test]
fn test_hoisted_declarations() {
    let module = parse(
        r#"
fn main()
{
    let d: Data;
    let v = helper(d);
}

fn helper(d: Data) -> f32 { return d.value; }

struct Data { value: f32 }
"#,
    );
    let analysis = analyze(&module).unwrap();
    assert_eq!(
        analysis.type_of(let_init(&module, 1)).unwrap(),
        ExpressionType::Primitive(PrimitiveType::F32)
    );
}

#[test]
fn test_expression_types() {
    let module = parse(
        r#"
fn main()
{
    let a = vec3[f32](1.0, 2.0, 3.0) * 2.0;
    let b = a.xy;
    let c = dot(a, a);
    let d = mat4[f32](vec4[f32](1.0, 0.0, 0.0, 0.0), vec4[f32](0.0, 1.0, 0.0, 0.0), vec4[f32](0.0, 0.0, 1.0, 0.0), vec4[f32](0.0, 0.0, 0.0, 1.0)) * vec4[f32](a, 1.0);
    let e = a.x > 0.0 && true;
    let f = u32(c);
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let ty = |n| analysis.type_of(let_init(&module, n)).unwrap();
    assert_eq!(ty(0), ExpressionType::Vector(PrimitiveType::F32, 3));
    assert_eq!(ty(1), ExpressionType::Vector(PrimitiveType::F32, 2));
    assert_eq!(ty(2), ExpressionType::Primitive(PrimitiveType::F32));
    assert_eq!(ty(3), ExpressionType::Vector(PrimitiveType::F32, 4));
    assert_eq!(ty(4), ExpressionType::BOOL);
    assert_eq!(ty(5), ExpressionType::Primitive(PrimitiveType::U32));
}

#[test]
fn test_type_errors() {
    assert_eq!(
        analyze_err("fn main() { let x = 1 + 1.0; }"),
        "operator + is not defined for i32 and f32"
    );
    assert_eq!(analyze_err("fn main() { let x = bool(1.0); }"), "cannot construct bool from (f32)");
    assert_eq!(
        analyze_err("fn main() { let x = cross(vec2[f32](1.0, 1.0), vec2[f32](1.0, 1.0)); }"),
        "no overload of cross takes (vec2[f32], vec2[f32])"
    );
    assert_eq!(
        analyze_err("fn main() { let v = vec2[f32](1.0, 1.0); let x = v.z; }"),
        "component 2 is out of range for vec2[f32]"
    );
    assert_eq!(
        analyze_err("fn main() -> f32 { return 1; }"),
        "function returns f32 but i32 was returned"
    );
}

#[test]
fn test_alias_transparency() {
    let module = parse(
        r#"
struct Data { value: f32 }
alias First = Data;
alias Second = First;

fn main()
{
    let a: Second;
    let b: Data;
    let x = a.value;
    let y = b.value;
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let data = struct_by_name(&analysis, "Data");
    let body = &find_function(&module, "main").body;
    let var_type = |n: usize| match &body[n].kind {
        StatementKind::DeclareVariable(x) => analysis.decl_type(analysis.variable_id(x).unwrap()).unwrap(),
        x => panic!("unexpected {:?}", x),
    };
    assert_eq!(var_type(0), ExpressionType::Struct(data));
    assert_eq!(var_type(0), var_type(1));
    assert_eq!(analysis.field_of(let_init(&module, 2)), Some((data, 0)));
    assert_eq!(analysis.field_of(let_init(&module, 3)), Some((data, 0)));
}

#[test]
fn test_option_default_type() {
    assert_eq!(
        analyze_err("option Red: bool = 1;"),
        "option Red is declared as bool but its default value is i32"
    );
    let module = parse("option Red: bool = false;\noption Blue: bool = !Red;");
    assert!(analyze(&module).is_ok());
}

#[test]
fn test_alias_cycle() {
    let msg = analyze_err("alias A = B;\nalias B = A;");
    assert_eq!(msg, "alias A is part of a cycle");
}

#[test]
fn test_module_member_access() {
    let module = parse(
        r#"
[nzsl_version("1.0")]
module _0badf00d
{
    [export]
    struct Light { color: vec3[f32] }

    [export]
    fn intensity(light: Light) -> f32 { return light.color.x; }
}

alias Light = _0badf00d.Light;

fn main()
{
    let light: Light;
    let i = _0badf00d.intensity(light);
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    assert_eq!(
        analysis.type_of(let_init(&module, 1)).unwrap(),
        ExpressionType::Primitive(PrimitiveType::F32)
    );
    let light = struct_by_name(&analysis, "Light");
    assert_eq!(analysis.decl(light).module, Some(0));
    assert_eq!(analysis.module_member(0, "Light"), Some(light));
}

#[test]
fn test_options_are_indexed_in_order() {
    let module = parse("option A: bool;\noption B: bool;\n[cond(B)] fn main() {}");
    let analysis = analyze(&module).unwrap();
    assert_eq!(analysis.options().len(), 2);
    assert_eq!(analysis.option_bits("B"), vec![1]);
    assert_eq!(analyze_err("option C: f32;"), "option C must be a bool, found f32");
}

#[test]
fn test_std140_and_std430_layouts() {
    let module = parse(
        r#"
struct Block
{
    a: f32,
    b: vec3[f32],
    c: f32,
    d: mat4[f32],
    e: array[f32, 2]
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let id = struct_by_name(&analysis, "Block");

    let offsets = |rule| {
        struct_layout(&analysis, id, rule)
            .unwrap()
            .fields
            .iter()
            .map(|x: &FieldLayout| x.offset)
            .collect::<Vec<_>>()
    };
    assert_eq!(offsets(MemoryLayout::Std140), vec![0, 16, 28, 32, 96]);
    assert_eq!(offsets(MemoryLayout::Std430), vec![0, 16, 28, 32, 96]);
    assert_eq!(struct_layout(&analysis, id, MemoryLayout::Std140).unwrap().size, 128);
    assert_eq!(struct_layout(&analysis, id, MemoryLayout::Std430).unwrap().size, 112);
}

#[test]
fn test_layout_overflow() {
    let module = parse(
        r#"
struct Huge { values: array[vec4[f32], 1000000000] }
struct Big
{
    a: array[vec4[f32], 200000000],
    b: array[vec4[f32], 200000000]
}
"#,
    );
    let analysis = analyze(&module).unwrap();
    let err = struct_layout(&analysis, struct_by_name(&analysis, "Huge"), MemoryLayout::Std140).unwrap_err();
    assert_eq!(
        err.downcast_ref::<CompileError>().unwrap().message,
        "array[vec4[f32], 1000000000] is too large to be laid out in memory"
    );
    let err = struct_layout(&analysis, struct_by_name(&analysis, "Big"), MemoryLayout::Std140).unwrap_err();
    assert_eq!(
        err.downcast_ref::<CompileError>().unwrap().message,
        "struct Big is too large to be laid out in memory"
    );
}
