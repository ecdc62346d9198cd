//! Token stream to module AST.
use anyhow::Result;

use super::ast::{ImportDirective, ImportedModule, Module, ModuleMetadata, Statement, StatementKind};
use super::common::{Span, SpanBuilder};
use super::error::{ParseError, ParseErrorKind};
use super::lex::{self, Token, TokenKind};

pub mod attr;
pub mod expr;
pub mod stmt;

#[cfg(test)]
mod tests;

use attr::{AttributeSet, Attribute};

pub type PResult<T> = std::result::Result<T, ParseError>;

/// Nesting limit for expressions and blocks.
pub const MAX_DEPTH: u32 = 128;

pub trait Parse {
    fn parse(input: &mut ParseBuffer) -> PResult<Self>
    where
        Self: Sized;
}
impl<P: Parse> Parse for Box<P> {
    fn parse(input: &mut ParseBuffer) -> PResult<Self> {
        let p = input.parse::<P>()?;
        Ok(Box::new(p))
    }
}

#[derive(Clone)]
pub struct ParseBuffer<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: u32,
}
impl<'a> ParseBuffer<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse<P: Parse>(&mut self) -> PResult<P> {
        P::parse(self)
    }

    pub fn peek(&self) -> &Token {
        self.peek_nth(0)
    }
    pub fn peek_nth(&self, n: usize) -> &Token {
        // The lexer guarantees a trailing `EndOfStream`.
        let i = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        &self.tokens[i]
    }
    pub fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }
    pub fn is(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }
    pub fn is_empty(&self) -> bool {
        self.is(&TokenKind::EndOfStream)
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::EndOfStream {
            self.pos += 1;
        }
        token
    }
    /// Span of the previously consumed token.
    pub fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return Span::call_site();
        }
        self.tokens[self.pos - 1].span
    }
    pub fn span_from(&self, start: Span) -> Span {
        let mut builder = SpanBuilder::new();
        builder.push(start);
        builder.push(self.prev_span());
        builder.into()
    }

    pub fn eat(&mut self, kind: &TokenKind) -> Option<Span> {
        if self.is(kind) {
            Some(self.advance().span)
        } else {
            None
        }
    }
    pub fn expect(&mut self, kind: TokenKind) -> PResult<Span> {
        if self.is(&kind) {
            return Ok(self.advance().span);
        }
        let token = self.peek();
        let expected = kind.to_string();
        Err(ParseError::new(
            ParseErrorKind::ExpectedToken {
                expected,
                found: token.kind.to_string(),
            },
            token.span,
        ))
    }
    pub fn expect_identifier(&mut self) -> PResult<(String, Span)> {
        match self.peek_kind() {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected()),
        }
    }
    pub fn unexpected(&self) -> ParseError {
        let token = self.peek();
        ParseError::new(ParseErrorKind::UnexpectedToken(token.kind.to_string()), token.span)
    }

    pub fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(ParseErrorKind::ExpressionTooDeep, self.peek().span));
        }
        Ok(())
    }
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Parses a whole token stream into a module.
pub fn parse(tokens: &[Token]) -> PResult<Module> {
    let mut input = ParseBuffer::new(tokens);
    let mut module = parse_module_header(&mut input)?;

    loop {
        let attrs = input.parse::<Vec<Attribute>>()?;
        match input.peek_kind() {
            TokenKind::EndOfStream => {
                if let Some(attr) = attrs.first() {
                    let kind = ParseErrorKind::UnexpectedAttribute(attr.name.clone());
                    return Err(ParseError::new(kind, attr.span));
                }
                break;
            }
            TokenKind::Import => {
                AttributeSet::new(attrs).finish()?;
                let import = parse_import(&mut input)?;
                module.imports.push(import);
            }
            TokenKind::Module => {
                let start = input.peek().span;
                let is_block = matches!(input.peek_nth(1).kind, TokenKind::Identifier(_))
                    && input.peek_nth(2).kind == TokenKind::OpenCurlyBracket;
                if !is_block {
                    return Err(ParseError::new(ParseErrorKind::DuplicateModuleHeader, start));
                }
                let imported = parse_module_block(&mut input, attrs)?;
                module.imported_modules.push(imported);
            }
            _ => {
                let stmt = stmt::parse_top_level(&mut input, attrs)?;
                module.statements.push(stmt);
            }
        }
    }
    Ok(module)
}

/// Tokenizes and parses source text.
pub fn parse_source(text: &str) -> Result<Module> {
    let tokens = lex::tokenize(text)?;
    let module = parse(&tokens)?;
    Ok(module)
}

fn parse_module_header(input: &mut ParseBuffer) -> PResult<Module> {
    let attrs = input.parse::<Vec<Attribute>>()?;
    if !input.is(&TokenKind::Module) {
        return Err(input.unexpected());
    }
    let module_span = input.advance().span;
    let metadata = parse_module_attributes(attrs, module_span)?;

    let mut module = Module {
        metadata,
        ..Default::default()
    };
    if input.eat(&TokenKind::Semicolon).is_none() {
        let path = parse_path(input)?;
        input.expect(TokenKind::Semicolon)?;
        module.metadata.module_name = Some(path.join("."));
    }
    Ok(module)
}

fn parse_module_attributes(attrs: Vec<Attribute>, module_span: Span) -> PResult<ModuleMetadata> {
    let mut attrs = AttributeSet::new(attrs);
    let mut metadata = ModuleMetadata::default();

    let version = attrs
        .take_unique("nzsl_version")?
        .ok_or_else(|| ParseError::new(ParseErrorKind::MissingAttribute("nzsl_version"), module_span))?;
    let text = version.string_arg()?;
    metadata.lang_version = super::ast::LangVersion::parse(&text)
        .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidVersion(text.clone()), version.span))?;

    if let Some(attr) = attrs.take_unique("author")? {
        metadata.author = Some(attr.string_arg()?);
    }
    if let Some(attr) = attrs.take_unique("desc")? {
        metadata.description = Some(attr.string_arg()?);
    }
    if let Some(attr) = attrs.take_unique("uuid")? {
        let text = attr.string_arg()?;
        let uuid = text
            .parse()
            .map_err(|_| ParseError::new(ParseErrorKind::InvalidUuid(text.clone()), attr.span))?;
        metadata.uuid = Some(uuid);
    }
    attrs.finish()?;
    Ok(metadata)
}

/// `[attrs] module _id { ... }`, the printed form of an imported module.
fn parse_module_block(input: &mut ParseBuffer, attrs: Vec<Attribute>) -> PResult<ImportedModule> {
    let module_span = input.expect(TokenKind::Module)?;
    let metadata = parse_module_attributes(attrs, module_span)?;
    let (identifier, _) = input.expect_identifier()?;
    input.expect(TokenKind::OpenCurlyBracket)?;

    let mut statements = Vec::new();
    loop {
        let attrs = input.parse::<Vec<Attribute>>()?;
        if attrs.is_empty() && input.eat(&TokenKind::ClosingCurlyBracket).is_some() {
            break;
        }
        statements.push(stmt::parse_top_level(input, attrs)?);
    }

    let module = Module {
        metadata,
        imports: Vec::new(),
        imported_modules: Vec::new(),
        statements,
    };
    Ok(ImportedModule { identifier, module })
}

fn parse_import(input: &mut ParseBuffer) -> PResult<ImportDirective> {
    let start = input.expect(TokenKind::Import)?;
    let path = parse_path(input)?;
    input.expect(TokenKind::Semicolon)?;
    Ok(ImportDirective {
        path,
        span: input.span_from(start),
    })
}

/// Dotted identifier path, `A.B.C`.
pub fn parse_path(input: &mut ParseBuffer) -> PResult<Vec<String>> {
    let (first, _) = input.expect_identifier()?;
    let mut path = vec![first];
    while input.eat(&TokenKind::Dot).is_some() {
        let (name, _) = input.expect_identifier()?;
        path.push(name);
    }
    Ok(path)
}

/// Wraps a declaration carrying a `[cond(..)]` attribute.
pub(crate) fn wrap_cond(stmt: Statement, cond: Option<super::ast::Expression>) -> Statement {
    match cond {
        Some(condition) => {
            let span = stmt.span;
            Statement::new(
                StatementKind::Conditional(super::ast::ConditionalStatement {
                    condition,
                    statement: Box::new(stmt),
                }),
                span,
            )
        }
        None => stmt,
    }
}
