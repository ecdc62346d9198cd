use super::attr::{Attribute, AttributeSet};
use super::{wrap_cond, ParseBuffer, PResult};
use crate::compiler::ast::*;
use crate::compiler::error::{ParseError, ParseErrorKind};
use crate::compiler::lex::TokenKind;

/// Parses one module-scope declaration preceded by its attributes.
pub fn parse_top_level(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    match input.peek_kind() {
        TokenKind::Struct => parse_struct(input, attrs),
        TokenKind::Fn => parse_function(input, attrs),
        TokenKind::External => parse_external(input, attrs),
        TokenKind::Alias => parse_alias(input, attrs),
        TokenKind::Option => parse_option(input, attrs),
        TokenKind::Const => parse_const(input, attrs),
        _ => Err(input.unexpected()),
    }
}

fn invalid(name: &str, span: crate::compiler::common::Span) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidParameter(name.to_string()), span)
}

fn parse_struct(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    let export = attrs.take_flag("export")?;
    let layout = match attrs.take_unique("layout")? {
        Some(attr) => {
            let name = attr.ident_arg()?;
            Some(MemoryLayout::from_name(&name).ok_or_else(|| invalid("layout", attr.span))?)
        }
        None => None,
    };
    attrs.finish()?;

    let start = input.expect(TokenKind::Struct)?;
    let (name, _) = input.expect_identifier()?;
    input.expect(TokenKind::OpenCurlyBracket)?;

    let mut fields = Vec::new();
    while !input.is(&TokenKind::ClosingCurlyBracket) {
        let field_attrs = input.parse::<Vec<Attribute>>()?;
        fields.push(parse_struct_field(input, field_attrs)?);
        if input.eat(&TokenKind::Comma).is_none() {
            break;
        }
    }
    input.expect(TokenKind::ClosingCurlyBracket)?;

    let decl = StructDecl {
        name,
        layout,
        export,
        fields,
    };
    let stmt = Statement::new(StatementKind::DeclareStruct(decl), input.span_from(start));
    Ok(wrap_cond(stmt, cond))
}

fn parse_struct_field(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<StructField> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    let location = attrs.take_unique("location")?.map(|x| x.uint_arg()).transpose()?;
    let builtin = match attrs.take_unique("builtin")? {
        Some(attr) => {
            let name = attr.ident_arg()?;
            Some(BuiltinEntry::from_name(&name).ok_or_else(|| invalid("builtin", attr.span))?)
        }
        None => None,
    };
    attrs.finish()?;

    let (name, start) = input.expect_identifier()?;
    input.expect(TokenKind::Colon)?;
    let ty = input.parse::<TypeExpr>()?;
    Ok(StructField {
        name,
        ty,
        location,
        builtin,
        cond,
        span: input.span_from(start),
    })
}

fn parse_external(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    let set = attrs.take_unique("set")?.map(|x| x.uint_arg()).transpose()?;
    attrs.finish()?;

    let start = input.expect(TokenKind::External)?;
    input.expect(TokenKind::OpenCurlyBracket)?;
    let mut vars = Vec::new();
    while !input.is(&TokenKind::ClosingCurlyBracket) {
        let mut var_attrs = AttributeSet::new(input.parse::<Vec<Attribute>>()?);
        let var_set = var_attrs.take_unique("set")?.map(|x| x.uint_arg()).transpose()?;
        let binding = var_attrs.take_unique("binding")?.map(|x| x.uint_arg()).transpose()?;
        var_attrs.finish()?;

        let (name, var_start) = input.expect_identifier()?;
        input.expect(TokenKind::Colon)?;
        let ty = input.parse::<TypeExpr>()?;
        vars.push(ExternalVar {
            name,
            ty,
            set: var_set,
            binding,
            span: input.span_from(var_start),
        });
        if input.eat(&TokenKind::Comma).is_none() {
            break;
        }
    }
    input.expect(TokenKind::ClosingCurlyBracket)?;

    let decl = ExternalDecl { set, vars };
    let stmt = Statement::new(StatementKind::DeclareExternal(decl), input.span_from(start));
    Ok(wrap_cond(stmt, cond))
}

fn parse_function(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    let export = attrs.take_flag("export")?;
    let entry = match attrs.take_unique("entry")? {
        Some(attr) => {
            let name = attr.ident_arg()?;
            Some(ShaderStage::from_name(&name).ok_or_else(|| invalid("entry", attr.span))?)
        }
        None => None,
    };
    let depth_write = match attrs.take_unique("depth_write")? {
        Some(attr) => {
            let name = attr.ident_arg()?;
            Some(DepthWriteMode::from_name(&name).ok_or_else(|| invalid("depth_write", attr.span))?)
        }
        None => None,
    };
    let early_fragment_tests = attrs
        .take_unique("early_fragment_tests")?
        .map(|x| x.bool_arg())
        .transpose()?;
    let workgroup = match attrs.take_unique("workgroup")? {
        Some(attr) => {
            let sizes = attr.uint_args()?;
            match sizes.as_slice() {
                [x, y, z] => Some([*x, *y, *z]),
                _ => return Err(invalid("workgroup", attr.span)),
            }
        }
        None => None,
    };
    attrs.finish()?;

    let start = input.expect(TokenKind::Fn)?;
    let (name, _) = input.expect_identifier()?;
    input.expect(TokenKind::OpenParenthesis)?;
    let mut params = Vec::new();
    while !input.is(&TokenKind::ClosingParenthesis) {
        let (param_name, param_start) = input.expect_identifier()?;
        input.expect(TokenKind::Colon)?;
        let ty = input.parse::<TypeExpr>()?;
        params.push(Parameter {
            name: param_name,
            ty,
            span: input.span_from(param_start),
        });
        if input.eat(&TokenKind::Comma).is_none() {
            break;
        }
    }
    input.expect(TokenKind::ClosingParenthesis)?;
    let return_type = if input.eat(&TokenKind::Arrow).is_some() {
        Some(input.parse::<TypeExpr>()?)
    } else {
        None
    };
    let body = parse_block(input)?;

    let decl = FunctionDecl {
        name,
        params,
        return_type,
        entry,
        export,
        depth_write,
        early_fragment_tests,
        workgroup,
        body,
    };
    let stmt = Statement::new(StatementKind::DeclareFunction(decl), input.span_from(start));
    Ok(wrap_cond(stmt, cond))
}

fn parse_alias(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    attrs.finish()?;

    let start = input.expect(TokenKind::Alias)?;
    let (name, _) = input.expect_identifier()?;
    input.expect(TokenKind::Assign)?;
    let target = input.parse::<TypeExpr>()?;
    input.expect(TokenKind::Semicolon)?;

    let stmt = Statement::new(
        StatementKind::DeclareAlias(AliasDecl { name, target }),
        input.span_from(start),
    );
    Ok(wrap_cond(stmt, cond))
}

fn parse_option(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    attrs.finish()?;

    let start = input.expect(TokenKind::Option)?;
    let (name, _) = input.expect_identifier()?;
    input.expect(TokenKind::Colon)?;
    let ty = input.parse::<TypeExpr>()?;
    let default = if input.eat(&TokenKind::Assign).is_some() {
        Some(input.parse::<Expression>()?)
    } else {
        None
    };
    input.expect(TokenKind::Semicolon)?;

    let stmt = Statement::new(
        StatementKind::DeclareOption(OptionDecl { name, ty, default }),
        input.span_from(start),
    );
    Ok(wrap_cond(stmt, cond))
}

fn parse_const(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<Statement> {
    let mut attrs = AttributeSet::new(attrs);
    let cond = attrs.take_cond()?;
    attrs.finish()?;

    let start = input.expect(TokenKind::Const)?;
    let (name, _) = input.expect_identifier()?;
    let ty = if input.eat(&TokenKind::Colon).is_some() {
        Some(input.parse::<TypeExpr>()?)
    } else {
        None
    };
    input.expect(TokenKind::Assign)?;
    let value = input.parse::<Expression>()?;
    input.expect(TokenKind::Semicolon)?;

    let stmt = Statement::new(
        StatementKind::DeclareConst(ConstDecl { name, ty, value }),
        input.span_from(start),
    );
    Ok(wrap_cond(stmt, cond))
}

/// `{ statements }`
fn parse_block(input: &mut ParseBuffer) -> PResult<Vec<Statement>> {
    input.expect(TokenKind::OpenCurlyBracket)?;
    input.enter()?;
    let mut stmts = Vec::new();
    while input.eat(&TokenKind::ClosingCurlyBracket).is_none() {
        if input.is_empty() {
            return Err(input.unexpected());
        }
        stmts.push(parse_statement(input)?);
    }
    input.leave();
    Ok(stmts)
}

/// Body of a branch arm. Arms always become scoped blocks so that printing
/// them with braces reads back identically.
fn parse_arm(input: &mut ParseBuffer) -> PResult<Statement> {
    let start = input.peek().span;
    if input.is(&TokenKind::OpenCurlyBracket) {
        let stmts = parse_block(input)?;
        return Ok(Statement::new(StatementKind::Scoped(stmts), input.span_from(start)));
    }
    let stmt = parse_statement(input)?;
    let span = stmt.span;
    Ok(Statement::new(StatementKind::Scoped(vec![stmt]), span))
}

fn parse_branch(input: &mut ParseBuffer) -> PResult<Statement> {
    let start = input.peek().span;
    let is_const = input.eat(&TokenKind::Const).is_some();
    let mut cond_statements = Vec::new();
    let mut else_statement = None;

    input.expect(TokenKind::If)?;
    loop {
        input.expect(TokenKind::OpenParenthesis)?;
        let cond = input.parse::<Expression>()?;
        input.expect(TokenKind::ClosingParenthesis)?;
        let body = parse_arm(input)?;
        cond_statements.push((cond, body));

        if input.eat(&TokenKind::Else).is_none() {
            break;
        }
        if input.eat(&TokenKind::If).is_none() {
            else_statement = Some(Box::new(parse_arm(input)?));
            break;
        }
    }

    let branch = BranchStatement {
        cond_statements,
        else_statement,
        is_const,
    };
    Ok(Statement::new(StatementKind::Branch(branch), input.span_from(start)))
}

fn parse_statement(input: &mut ParseBuffer) -> PResult<Statement> {
    let start = input.peek().span;
    let kind = match input.peek_kind() {
        TokenKind::Let => {
            input.advance();
            let (name, _) = input.expect_identifier()?;
            let ty = if input.eat(&TokenKind::Colon).is_some() {
                Some(input.parse::<TypeExpr>()?)
            } else {
                None
            };
            let init = if input.eat(&TokenKind::Assign).is_some() {
                Some(input.parse::<Expression>()?)
            } else {
                None
            };
            input.expect(TokenKind::Semicolon)?;
            StatementKind::DeclareVariable(VariableDecl { name, ty, init })
        }
        TokenKind::If => return parse_branch(input),
        TokenKind::Const if input.peek_nth(1).kind == TokenKind::If => return parse_branch(input),
        TokenKind::Const => return parse_const(input, Vec::new()),
        TokenKind::Struct => return parse_struct(input, Vec::new()),
        TokenKind::Alias => return parse_alias(input, Vec::new()),
        TokenKind::Discard => {
            input.advance();
            input.expect(TokenKind::Semicolon)?;
            StatementKind::Discard
        }
        TokenKind::Return => {
            input.advance();
            let value = if input.is(&TokenKind::Semicolon) {
                None
            } else {
                Some(input.parse::<Expression>()?)
            };
            input.expect(TokenKind::Semicolon)?;
            StatementKind::Return(value)
        }
        TokenKind::OpenCurlyBracket => StatementKind::Scoped(parse_block(input)?),
        _ => {
            let expr = input.parse::<Expression>()?;
            input.expect(TokenKind::Semicolon)?;
            StatementKind::Expression(expr)
        }
    };
    Ok(Statement::new(kind, input.span_from(start)))
}
