use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::ast::*;
use crate::compiler::common::{ConstantValue, PrimitiveType, Span};

fn parse_text(text: &str) -> PResult<Module> {
    let tokens = lex::tokenize(text).unwrap();
    parse(&tokens)
}

fn parse_err(text: &str) -> ParseError {
    parse_text(text).unwrap_err()
}

fn function_body(module: &Module, name: &str) -> Vec<Statement> {
    for stmt in &module.statements {
        if let StatementKind::DeclareFunction(func) = &stmt.kind {
            if func.name == name {
                return func.body.clone();
            }
        }
    }
    panic!("no function {}", name);
}

#[test]
fn test_unexpected_token() {
    let err = parse_err("nazara");
    assert!(matches!(err.kind, ParseErrorKind::UnexpectedToken(_)));
    assert_eq!(err.span, Span::new(1, 1, 1, 6));
}

#[test]
fn test_missing_version() {
    let err = parse_err("module;");
    assert_eq!(err.kind, ParseErrorKind::MissingAttribute("nzsl_version"));
}

#[test]
fn test_duplicate_version() {
    let err = parse_err(
        r#"
[nzsl_version("1.0")]
[nzsl_version("1.0")]
module;
"#,
    );
    assert_eq!(err.kind, ParseErrorKind::AttributeMultipleUnique("nzsl_version".to_string()));
    assert_eq!(err.span.start.line, 3);
}

#[test]
fn test_version_requires_parameter() {
    let err = parse_err("[nzsl_version] module;");
    assert_eq!(err.kind, ParseErrorKind::AttributeMissingParameter("nzsl_version".to_string()));
}

#[test]
fn test_invalid_uuid() {
    let err = parse_err(r#"[nzsl_version("1.0"), uuid("nazara")] module;"#);
    assert_eq!(err.kind, ParseErrorKind::InvalidUuid("nazara".to_string()));
}

#[test]
fn test_module_header() {
    let module = parse_text(
        r#"
[nzsl_version("1.0")]
[author("Lynix"), desc("Test module")]
[uuid("ad3aed6e-0619-4a26-b5ce-abc2ec0836c4")]
module Engine.Lighting;
"#,
    )
    .unwrap();
    let metadata = &module.metadata;
    assert_eq!(metadata.module_name.as_deref(), Some("Engine.Lighting"));
    assert_eq!(metadata.author.as_deref(), Some("Lynix"));
    assert_eq!(metadata.description.as_deref(), Some("Test module"));
    assert_eq!(metadata.lang_version, LangVersion { major: 1, minor: 0 });
    assert_eq!(
        metadata.uuid.map(|x| x.to_string()),
        Some("ad3aed6e-0619-4a26-b5ce-abc2ec0836c4".to_string())
    );
}

#[test]
fn test_second_module_header_is_rejected() {
    let err = parse_err(r#"[nzsl_version("1.0")] module; module;"#);
    assert_eq!(err.kind, ParseErrorKind::DuplicateModuleHeader);
}

#[test]
fn test_unknown_attribute() {
    let err = parse_err(
        r#"[nzsl_version("1.0")] module;
[nazara] struct Foo {}"#,
    );
    assert_eq!(err.kind, ParseErrorKind::UnexpectedAttribute("nazara".to_string()));
}

#[test]
fn test_declarations() {
    let module = parse_text(
        r#"
[nzsl_version("1.0")]
module;

import Modules.Data;

option UseFog: bool;
const Scale = 2.0;

[layout(std140)]
struct Data
{
    value: f32,
    [cond(UseFog)] fog: vec3[f32]
}

external
{
    [set(1), binding(0)] data: uniform[Data],
    [binding(1)] tex: sampler2D[f32]
}

alias Block = Data;

[entry(frag), depth_write(greater)]
fn main() {}
"#,
    )
    .unwrap();

    assert_eq!(module.imports[0].path, vec!["Modules".to_string(), "Data".to_string()]);
    assert_eq!(module.statements.len(), 6);
    match &module.statements[2].kind {
        StatementKind::DeclareStruct(decl) => {
            assert_eq!(decl.layout, Some(MemoryLayout::Std140));
            assert_eq!(decl.fields.len(), 2);
            assert!(decl.fields[1].cond.is_some());
            assert_eq!(
                decl.fields[1].ty,
                TypeExpr::Vector {
                    base: PrimitiveType::F32,
                    count: 3
                }
            );
        }
        x => panic!("unexpected {:?}", x),
    }
    match &module.statements[3].kind {
        StatementKind::DeclareExternal(decl) => {
            assert_eq!(decl.vars[0].set, Some(1));
            assert_eq!(decl.vars[0].binding, Some(0));
            assert_eq!(decl.vars[1].set, None);
            assert_eq!(
                decl.vars[0].ty,
                TypeExpr::Uniform(Box::new(TypeExpr::Named(vec!["Data".to_string()])))
            );
        }
        x => panic!("unexpected {:?}", x),
    }
    match &module.statements[5].kind {
        StatementKind::DeclareFunction(func) => {
            assert_eq!(func.entry, Some(ShaderStage::Fragment));
            assert_eq!(func.depth_write, Some(DepthWriteMode::Greater));
        }
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn test_local_declarations() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
option Red: bool = false;

fn main()
{
    struct Local { x: f32 }
    alias Other = Local;
    const K = 2.0;
    let v: Other;
}
"#,
    )
    .unwrap();
    match &module.statements[0].kind {
        StatementKind::DeclareOption(decl) => {
            assert_eq!(decl.default, Some(Expression::constant(ConstantValue::Bool(false), Span::call_site())));
        }
        x => panic!("unexpected {:?}", x),
    }
    let body = function_body(&module, "main");
    assert!(matches!(&body[0].kind, StatementKind::DeclareStruct(x) if x.name == "Local"));
    assert!(matches!(&body[1].kind, StatementKind::DeclareAlias(x) if x.name == "Other"));
    assert!(matches!(&body[2].kind, StatementKind::DeclareConst(x) if x.name == "K"));
    assert!(matches!(&body[3].kind, StatementKind::DeclareVariable(_)));
}

#[test]
fn test_cond_attribute_wraps_declaration() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
option Enabled: bool;
[cond(Enabled)]
fn helper() {}
"#,
    )
    .unwrap();
    match &module.statements[1].kind {
        StatementKind::Conditional(cond) => {
            assert_eq!(cond.condition.kind, ExpressionKind::Identifier("Enabled".to_string()));
            assert!(matches!(cond.statement.kind, StatementKind::DeclareFunction(_)));
        }
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn test_operator_precedence() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
fn f() { let x = 1 + 2 * 3 == 7 && true; }
"#,
    )
    .unwrap();
    let body = function_body(&module, "f");
    let init = match &body[0].kind {
        StatementKind::DeclareVariable(decl) => decl.init.clone().unwrap(),
        x => panic!("unexpected {:?}", x),
    };
    let c = |x: i32| Box::new(Expression::constant(ConstantValue::I32(x), Span::call_site()));
    let bin = |op, lhs, rhs| {
        Box::new(Expression::new(
            ExpressionKind::Binary { op, lhs, rhs },
            Span::call_site(),
        ))
    };
    let expected = bin(
        BinaryOp::LogicalAnd,
        bin(
            BinaryOp::CompEq,
            bin(BinaryOp::Add, c(1), bin(BinaryOp::Multiply, c(2), c(3))),
            c(7),
        ),
        Box::new(Expression::constant(ConstantValue::Bool(true), Span::call_site())),
    );
    assert_eq!(init, *expected);
}

#[test]
fn test_branch_arms_are_scoped() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
fn f()
{
    let value: f32;
    if (value > 0.0)
        value = 1.0;
    else if (value < 0.0)
        value = -1.0;
    else
    {
        discard;
    }
}
"#,
    )
    .unwrap();
    let body = function_body(&module, "f");
    match &body[1].kind {
        StatementKind::Branch(branch) => {
            assert!(!branch.is_const);
            assert_eq!(branch.cond_statements.len(), 2);
            assert!(matches!(&branch.cond_statements[0].1.kind, StatementKind::Scoped(x) if x.len() == 1));
            let else_stmt = branch.else_statement.as_ref().unwrap();
            assert_eq!(
                else_stmt.kind,
                StatementKind::Scoped(vec![Statement::new(StatementKind::Discard, Span::call_site())])
            );
        }
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn test_casts_and_intrinsics() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
fn f(tex: sampler2D[f32]) -> vec4[f32]
{
    let v = vec3[f32](1.0, 2.0, 3.0);
    let d = dot(v, v);
    return tex.Sample(vec2[f32](d, d));
}
"#,
    )
    .unwrap();
    let body = function_body(&module, "f");
    match &body[0].kind {
        StatementKind::DeclareVariable(VariableDecl { init: Some(init), .. }) => {
            assert!(matches!(&init.kind, ExpressionKind::Cast { args, .. } if args.len() == 3));
        }
        x => panic!("unexpected {:?}", x),
    }
    match &body[1].kind {
        StatementKind::DeclareVariable(VariableDecl { init: Some(init), .. }) => {
            assert!(matches!(
                &init.kind,
                ExpressionKind::Intrinsic { intrinsic: IntrinsicType::DotProduct, .. }
            ));
        }
        x => panic!("unexpected {:?}", x),
    }
    match &body[2].kind {
        StatementKind::Return(Some(expr)) => match &expr.kind {
            ExpressionKind::CallFunction { callee, args } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(&callee.kind, ExpressionKind::AccessMember { member, .. } if member == "Sample"));
            }
            x => panic!("unexpected {:?}", x),
        },
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn test_expression_too_deep() {
    let nested = "(".repeat(500) + "1" + &")".repeat(500);
    let source = format!("[nzsl_version(\"1.0\")] module;\nconst X = {};", nested);
    let err = parse_err(&source);
    assert_eq!(err.kind, ParseErrorKind::ExpressionTooDeep);

    // Long operator and member chains nest as deeply as parentheses.
    let sum = vec!["y"; 3000].join(" + ");
    let source = format!("[nzsl_version(\"1.0\")] module;\nfn main() {{ let x = {}; }}", sum);
    assert_eq!(parse_err(&source).kind, ParseErrorKind::ExpressionTooDeep);

    let members = "v".to_string() + &".x".repeat(3000);
    let source = format!("[nzsl_version(\"1.0\")] module;\nfn main() {{ let x = {}; }}", members);
    assert_eq!(parse_err(&source).kind, ParseErrorKind::ExpressionTooDeep);

    let sum = vec!["y"; 64].join(" + ");
    let source = format!("[nzsl_version(\"1.0\")] module;\nfn main() {{ let x = {}; }}", sum);
    assert!(parse_text(&source).is_ok());
}

#[test]
fn test_integer_literal_types() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
const A = 42;
const B = 0xFFFFFFFF;
"#,
    )
    .unwrap();
    let values = module
        .statements
        .iter()
        .map(|x| match &x.kind {
            StatementKind::DeclareConst(decl) => decl.value.as_constant().cloned(),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(values, vec![Some(ConstantValue::I32(42)), Some(ConstantValue::U32(u32::MAX))]);

    let err = parse_err("[nzsl_version(\"1.0\")] module;\nconst C = 0x1FFFFFFFF;");
    assert_eq!(err.kind, ParseErrorKind::LiteralOutOfRange);
    let err = parse_err("[nzsl_version(\"1.0\")] module;\nconst D = 1e39;");
    assert_eq!(err.kind, ParseErrorKind::LiteralOutOfRange);
}

#[test]
fn test_nested_module_block() {
    let module = parse_text(
        r#"[nzsl_version("1.0")] module;
[nzsl_version("1.0")]
module _181c45e9
{
    struct Data { value: f32 }
}
alias Data = _181c45e9.Data;
"#,
    )
    .unwrap();
    assert_eq!(module.imported_modules.len(), 1);
    assert_eq!(module.imported_modules[0].identifier, "_181c45e9");
    assert_eq!(module.imported_modules[0].module.statements.len(), 1);
    assert_eq!(
        module.statements[0].kind,
        StatementKind::DeclareAlias(AliasDecl {
            name: "Data".to_string(),
            target: TypeExpr::Named(vec!["_181c45e9".to_string(), "Data".to_string()]),
        })
    );
}
