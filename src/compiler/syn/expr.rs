use super::{Parse, ParseBuffer, PResult};
use crate::compiler::ast::{
    AssignOp, BinaryOp, Expression, ExpressionKind, IntrinsicType, SamplerDim, TypeExpr, UnaryOp,
};
use crate::compiler::common::{ConstantValue, PrimitiveType, Span};
use crate::compiler::error::{ParseError, ParseErrorKind};
use crate::compiler::lex::TokenKind;

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u32)> {
    let out = match kind {
        TokenKind::LogicalOr => (BinaryOp::LogicalOr, 1),
        TokenKind::LogicalAnd => (BinaryOp::LogicalAnd, 2),
        TokenKind::Equal => (BinaryOp::CompEq, 3),
        TokenKind::NotEqual => (BinaryOp::CompNe, 3),
        TokenKind::LessThan => (BinaryOp::CompLt, 4),
        TokenKind::LessThanEqual => (BinaryOp::CompLe, 4),
        TokenKind::GreaterThan => (BinaryOp::CompGt, 4),
        TokenKind::GreaterThanEqual => (BinaryOp::CompGe, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Subtract, 5),
        TokenKind::Multiply => (BinaryOp::Multiply, 6),
        TokenKind::Divide => (BinaryOp::Divide, 6),
        _ => return None,
    };
    Some(out)
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    let out = match kind {
        TokenKind::Assign => AssignOp::Simple,
        TokenKind::PlusAssign => AssignOp::Add,
        TokenKind::MinusAssign => AssignOp::Subtract,
        TokenKind::MultiplyAssign => AssignOp::Multiply,
        TokenKind::DivideAssign => AssignOp::Divide,
        _ => return None,
    };
    Some(out)
}

/// Whether `name` starts a builtin type (and therefore a cast when used as
/// an expression).
pub fn is_builtin_type_name(name: &str) -> bool {
    PrimitiveType::from_name(name).is_some()
        || matches!(name, "vec2" | "vec3" | "vec4" | "array")
        || parse_matrix_name(name).is_some()
        || parse_sampler_name(name).is_some()
}

fn parse_matrix_name(name: &str) -> Option<(u32, u32)> {
    let dims = name.strip_prefix("mat")?;
    let (columns, rows) = match dims.split_once('x') {
        Some((c, r)) => (c.parse::<u32>().ok()?, r.parse::<u32>().ok()?),
        None => {
            let n = dims.parse::<u32>().ok()?;
            (n, n)
        }
    };
    if (2..=4).contains(&columns) && (2..=4).contains(&rows) {
        Some((columns, rows))
    } else {
        None
    }
}

fn parse_sampler_name(name: &str) -> Option<SamplerDim> {
    match name.strip_prefix("sampler")? {
        "1D" => Some(SamplerDim::Dim1D),
        "2D" => Some(SamplerDim::Dim2D),
        "3D" => Some(SamplerDim::Dim3D),
        "Cube" => Some(SamplerDim::Cube),
        _ => None,
    }
}

fn parse_bracketed_primitive(input: &mut ParseBuffer) -> PResult<PrimitiveType> {
    input.expect(TokenKind::OpenSquareBracket)?;
    let (name, span) = input.expect_identifier()?;
    let prim = PrimitiveType::from_name(&name)
        .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownType(name.clone()), span))?;
    input.expect(TokenKind::ClosingSquareBracket)?;
    Ok(prim)
}

fn parse_array_length(input: &mut ParseBuffer) -> PResult<u32> {
    let token = input.advance();
    match token.kind {
        TokenKind::IntLiteral(x) if x > 0 && x <= u32::MAX as i64 => Ok(x as u32),
        kind => Err(ParseError::new(ParseErrorKind::UnexpectedToken(kind.to_string()), token.span)),
    }
}

impl Parse for TypeExpr {
    fn parse(input: &mut ParseBuffer) -> PResult<Self> {
        let (name, _) = input.expect_identifier()?;
        if let Some(prim) = PrimitiveType::from_name(&name) {
            return Ok(TypeExpr::Primitive(prim));
        }
        if let Some(count) = name.strip_prefix("vec").and_then(|x| x.parse::<u32>().ok()) {
            if (2..=4).contains(&count) {
                let base = parse_bracketed_primitive(input)?;
                return Ok(TypeExpr::Vector { base, count });
            }
        }
        if let Some((columns, rows)) = parse_matrix_name(&name) {
            let base = parse_bracketed_primitive(input)?;
            return Ok(TypeExpr::Matrix { base, columns, rows });
        }
        if let Some(dim) = parse_sampler_name(&name) {
            let sampled = parse_bracketed_primitive(input)?;
            return Ok(TypeExpr::Sampler { dim, sampled });
        }
        match name.as_str() {
            "array" => {
                input.expect(TokenKind::OpenSquareBracket)?;
                let element = input.parse::<Box<TypeExpr>>()?;
                input.expect(TokenKind::Comma)?;
                let length = parse_array_length(input)?;
                input.expect(TokenKind::ClosingSquareBracket)?;
                Ok(TypeExpr::Array { element, length })
            }
            "uniform" | "storage" => {
                input.expect(TokenKind::OpenSquareBracket)?;
                let inner = input.parse::<Box<TypeExpr>>()?;
                input.expect(TokenKind::ClosingSquareBracket)?;
                if name == "uniform" {
                    Ok(TypeExpr::Uniform(inner))
                } else {
                    Ok(TypeExpr::Storage(inner))
                }
            }
            _ => {
                let mut path = vec![name];
                while input.eat(&TokenKind::Dot).is_some() {
                    let (segment, _) = input.expect_identifier()?;
                    path.push(segment);
                }
                Ok(TypeExpr::Named(path))
            }
        }
    }
}

impl Parse for Expression {
    fn parse(input: &mut ParseBuffer) -> PResult<Self> {
        input.enter()?;
        let out = parse_assignment(input);
        input.leave();
        out
    }
}

fn parse_assignment(input: &mut ParseBuffer) -> PResult<Expression> {
    let lhs = parse_binary(input, 1)?;
    if let Some(op) = assign_op(input.peek_kind()) {
        input.advance();
        let rhs = input.parse::<Expression>()?;
        let span = Span::join([lhs.span, rhs.span]);
        let kind = ExpressionKind::Assign {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        return Ok(Expression::new(kind, span));
    }
    Ok(lhs)
}

/// Runs `f` and releases the nesting levels it entered for left-deep chains.
fn chained<T>(input: &mut ParseBuffer, f: impl FnOnce(&mut ParseBuffer, &mut u32) -> PResult<T>) -> PResult<T> {
    let mut nested = 0;
    let out = f(input, &mut nested);
    for _ in 0..nested {
        input.leave();
    }
    out
}

/// Each node folded onto a chain nests it one level deeper.
fn nest(input: &mut ParseBuffer, nested: &mut u32) -> PResult<()> {
    *nested += 1;
    input.enter()
}

fn parse_binary(input: &mut ParseBuffer, min_prec: u32) -> PResult<Expression> {
    chained(input, |input, nested| fold_binary(input, min_prec, nested))
}

fn fold_binary(input: &mut ParseBuffer, min_prec: u32, nested: &mut u32) -> PResult<Expression> {
    let mut lhs = parse_unary(input)?;
    while let Some((op, prec)) = binary_op(input.peek_kind()) {
        if prec < min_prec {
            break;
        }
        input.advance();
        input.enter()?;
        let rhs = parse_binary(input, prec + 1);
        input.leave();
        let rhs = rhs?;
        let span = Span::join([lhs.span, rhs.span]);
        let kind = ExpressionKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        lhs = Expression::new(kind, span);
        nest(input, nested)?;
    }
    Ok(lhs)
}

fn parse_unary(input: &mut ParseBuffer) -> PResult<Expression> {
    let op = match input.peek_kind() {
        TokenKind::Minus => UnaryOp::Minus,
        TokenKind::Not => UnaryOp::LogicalNot,
        _ => return parse_postfix(input),
    };
    let start = input.advance().span;
    input.enter()?;
    let expr = parse_unary(input);
    input.leave();
    let expr = expr?;
    let span = Span::join([start, expr.span]);
    Ok(Expression::new(
        ExpressionKind::Unary {
            op,
            expr: Box::new(expr),
        },
        span,
    ))
}

fn parse_call_args(input: &mut ParseBuffer) -> PResult<Vec<Expression>> {
    input.expect(TokenKind::OpenParenthesis)?;
    let mut args = Vec::new();
    if input.eat(&TokenKind::ClosingParenthesis).is_some() {
        return Ok(args);
    }
    loop {
        args.push(input.parse::<Expression>()?);
        if input.eat(&TokenKind::Comma).is_none() {
            break;
        }
    }
    input.expect(TokenKind::ClosingParenthesis)?;
    Ok(args)
}

fn parse_postfix(input: &mut ParseBuffer) -> PResult<Expression> {
    chained(input, fold_postfix)
}

fn fold_postfix(input: &mut ParseBuffer, nested: &mut u32) -> PResult<Expression> {
    let mut expr = parse_primary(input)?;
    loop {
        if !matches!(
            input.peek_kind(),
            TokenKind::Dot | TokenKind::OpenSquareBracket | TokenKind::OpenParenthesis
        ) {
            break;
        }
        nest(input, nested)?;
        match input.peek_kind() {
            TokenKind::Dot => {
                input.advance();
                let (member, _) = input.expect_identifier()?;
                let span = input.span_from(expr.span);
                let kind = ExpressionKind::AccessMember {
                    expr: Box::new(expr),
                    member,
                };
                expr = Expression::new(kind, span);
            }
            TokenKind::OpenSquareBracket => {
                input.advance();
                let index = input.parse::<Expression>()?;
                input.expect(TokenKind::ClosingSquareBracket)?;
                let span = input.span_from(expr.span);
                let kind = ExpressionKind::AccessIndex {
                    expr: Box::new(expr),
                    index: Box::new(index),
                };
                expr = Expression::new(kind, span);
            }
            TokenKind::OpenParenthesis => {
                let args = parse_call_args(input)?;
                let span = input.span_from(expr.span);
                let kind = ExpressionKind::CallFunction {
                    callee: Box::new(expr),
                    args,
                };
                expr = Expression::new(kind, span);
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn int_constant(value: i64, span: Span) -> PResult<ConstantValue> {
    if let Ok(x) = i32::try_from(value) {
        Ok(ConstantValue::I32(x))
    } else if let Ok(x) = u32::try_from(value) {
        Ok(ConstantValue::U32(x))
    } else {
        Err(ParseError::new(ParseErrorKind::LiteralOutOfRange, span))
    }
}

fn parse_primary(input: &mut ParseBuffer) -> PResult<Expression> {
    let token = input.peek().clone();
    let start = token.span;
    match token.kind {
        TokenKind::IntLiteral(x) => {
            input.advance();
            Ok(Expression::constant(int_constant(x, start)?, start))
        }
        TokenKind::FloatLiteral(x) => {
            input.advance();
            if !(x as f32).is_finite() {
                return Err(ParseError::new(ParseErrorKind::LiteralOutOfRange, start));
            }
            Ok(Expression::constant(ConstantValue::F32(x as f32), start))
        }
        TokenKind::True | TokenKind::False => {
            input.advance();
            let value = ConstantValue::Bool(token.kind == TokenKind::True);
            Ok(Expression::constant(value, start))
        }
        TokenKind::OpenParenthesis => {
            input.advance();
            let expr = input.parse::<Expression>()?;
            input.expect(TokenKind::ClosingParenthesis)?;
            Ok(expr)
        }
        TokenKind::ConstSelect => {
            input.advance();
            let args = parse_call_args(input)?;
            let span = input.span_from(start);
            let [condition, true_expr, false_expr]: [Expression; 3] = args.try_into().map_err(|_| {
                ParseError::new(ParseErrorKind::InvalidParameter("const_select".to_string()), span)
            })?;
            let kind = ExpressionKind::Conditional {
                condition: Box::new(condition),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            };
            Ok(Expression::new(kind, span))
        }
        TokenKind::Identifier(name) => {
            let next_is_call = input.peek_nth(1).kind == TokenKind::OpenParenthesis;
            if is_builtin_type_name(&name) {
                let target = input.parse::<TypeExpr>()?;
                let args = parse_call_args(input)?;
                let span = input.span_from(start);
                return Ok(Expression::new(ExpressionKind::Cast { target, args }, span));
            }
            if next_is_call {
                if let Some(intrinsic) = IntrinsicType::from_name(&name) {
                    input.advance();
                    let args = parse_call_args(input)?;
                    let span = input.span_from(start);
                    return Ok(Expression::new(ExpressionKind::Intrinsic { intrinsic, args }, span));
                }
            }
            input.advance();
            Ok(Expression::identifier(name, start))
        }
        _ => Err(input.unexpected()),
    }
}
