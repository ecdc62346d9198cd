//! Generic `[name(args), ...]` attribute lists, validated per declaration.
use super::{Parse, ParseBuffer, PResult};
use crate::compiler::ast::{Expression, ExpressionKind};
use crate::compiler::common::{ConstantValue, Span};
use crate::compiler::error::{ParseError, ParseErrorKind};
use crate::compiler::lex::TokenKind;

#[derive(Debug, Clone)]
pub enum AttributeArg {
    String(String),
    Expr(Expression),
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<AttributeArg>,
    pub span: Span,
}
impl Attribute {
    fn missing_parameter(&self) -> ParseError {
        ParseError::new(ParseErrorKind::AttributeMissingParameter(self.name.clone()), self.span)
    }
    fn invalid_parameter(&self) -> ParseError {
        ParseError::new(ParseErrorKind::InvalidParameter(self.name.clone()), self.span)
    }

    fn single_arg(&self) -> PResult<&AttributeArg> {
        match self.args.as_slice() {
            [] => Err(self.missing_parameter()),
            [x] => Ok(x),
            _ => Err(self.invalid_parameter()),
        }
    }
    fn single_expr(&self) -> PResult<&Expression> {
        match self.single_arg()? {
            AttributeArg::Expr(x) => Ok(x),
            AttributeArg::String(_) => Err(self.invalid_parameter()),
        }
    }

    pub fn expect_no_args(&self) -> PResult<()> {
        if self.args.is_empty() {
            Ok(())
        } else {
            Err(self.invalid_parameter())
        }
    }
    pub fn expr_arg(&self) -> PResult<Expression> {
        self.single_expr().cloned()
    }
    pub fn ident_arg(&self) -> PResult<String> {
        match &self.single_expr()?.kind {
            ExpressionKind::Identifier(x) => Ok(x.clone()),
            _ => Err(self.invalid_parameter()),
        }
    }
    pub fn string_arg(&self) -> PResult<String> {
        match self.single_arg()? {
            AttributeArg::String(x) => Ok(x.clone()),
            AttributeArg::Expr(_) => Err(self.invalid_parameter()),
        }
    }
    fn uint_of(&self, arg: &AttributeArg) -> PResult<u32> {
        match arg {
            AttributeArg::Expr(expr) => match &expr.kind {
                ExpressionKind::Constant(ConstantValue::I32(x)) if *x >= 0 => Ok(*x as u32),
                ExpressionKind::Constant(ConstantValue::U32(x)) => Ok(*x),
                _ => Err(self.invalid_parameter()),
            },
            AttributeArg::String(_) => Err(self.invalid_parameter()),
        }
    }
    pub fn uint_arg(&self) -> PResult<u32> {
        let arg = self.single_arg()?;
        self.uint_of(arg)
    }
    pub fn uint_args(&self) -> PResult<Vec<u32>> {
        if self.args.is_empty() {
            return Err(self.missing_parameter());
        }
        self.args.iter().map(|x| self.uint_of(x)).collect()
    }
    pub fn bool_arg(&self) -> PResult<bool> {
        match &self.single_expr()?.kind {
            ExpressionKind::Constant(ConstantValue::Bool(x)) => Ok(*x),
            _ => Err(self.invalid_parameter()),
        }
    }
}
impl Parse for Attribute {
    fn parse(input: &mut ParseBuffer) -> PResult<Self> {
        let (name, start) = input.expect_identifier()?;
        let mut args = Vec::new();
        if input.eat(&TokenKind::OpenParenthesis).is_some() {
            if input.eat(&TokenKind::ClosingParenthesis).is_none() {
                loop {
                    let arg = match input.peek_kind() {
                        TokenKind::StringLiteral(x) => {
                            let x = x.clone();
                            input.advance();
                            AttributeArg::String(x)
                        }
                        _ => AttributeArg::Expr(input.parse::<Expression>()?),
                    };
                    args.push(arg);
                    if input.eat(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
                input.expect(TokenKind::ClosingParenthesis)?;
            }
        }
        Ok(Attribute {
            name,
            args,
            span: input.span_from(start),
        })
    }
}
/// Zero or more bracketed attribute lists.
impl Parse for Vec<Attribute> {
    fn parse(input: &mut ParseBuffer) -> PResult<Self> {
        let mut out = Vec::new();
        while input.eat(&TokenKind::OpenSquareBracket).is_some() {
            loop {
                out.push(input.parse::<Attribute>()?);
                if input.eat(&TokenKind::Comma).is_none() {
                    break;
                }
            }
            input.expect(TokenKind::ClosingSquareBracket)?;
        }
        Ok(out)
    }
}

/// Attributes of one declaration, consumed by name. Anything left over once
/// the declaration is done is rejected by `finish`.
pub struct AttributeSet {
    attrs: Vec<Attribute>,
}
impl AttributeSet {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self { attrs }
    }

    /// Removes the attribute called `name`, rejecting duplicates.
    pub fn take_unique(&mut self, name: &str) -> PResult<Option<Attribute>> {
        let mut found = None;
        let mut rest = Vec::with_capacity(self.attrs.len());
        for attr in self.attrs.drain(..) {
            if attr.name != name {
                rest.push(attr);
                continue;
            }
            if found.is_some() {
                let kind = ParseErrorKind::AttributeMultipleUnique(attr.name.clone());
                return Err(ParseError::new(kind, attr.span));
            }
            found = Some(attr);
        }
        self.attrs = rest;
        Ok(found)
    }
    pub fn take_flag(&mut self, name: &str) -> PResult<bool> {
        match self.take_unique(name)? {
            Some(attr) => {
                attr.expect_no_args()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
    pub fn take_cond(&mut self) -> PResult<Option<Expression>> {
        self.take_unique("cond")?.map(|x| x.expr_arg()).transpose()
    }

    pub fn finish(self) -> PResult<()> {
        match self.attrs.into_iter().next() {
            Some(attr) => Err(ParseError::new(ParseErrorKind::UnexpectedAttribute(attr.name), attr.span)),
            None => Ok(()),
        }
    }
}
