//! Typed failures raised by each pass. Every pass stops at its first error.
use thiserror::Error;

use super::common::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("bad number")]
    BadNumber,
    #[error("number is out of range")]
    NumberOutOfRange,
    #[error("unfinished string")]
    UnfinishedString,
    #[error("unrecognized character `{0}`")]
    UnrecognizedChar(char),
    #[error("unrecognized token")]
    UnrecognizedToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{span}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}
impl LexError {
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("expected {expected}, found {found}")]
    ExpectedToken { expected: String, found: String },
    #[error("missing attribute {0}")]
    MissingAttribute(&'static str),
    #[error("attribute {0} requires a parameter")]
    AttributeMissingParameter(String),
    #[error("attribute {0} can only be present once")]
    AttributeMultipleUnique(String),
    #[error("unexpected attribute {0}")]
    UnexpectedAttribute(String),
    #[error("invalid parameter for attribute {0}")]
    InvalidParameter(String),
    #[error("invalid uuid {0:?}")]
    InvalidUuid(String),
    #[error("invalid language version {0:?}")]
    InvalidVersion(String),
    #[error("module header can only be declared once")]
    DuplicateModuleHeader,
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("expression is too deeply nested")]
    ExpressionTooDeep,
    #[error("literal is out of range of its type")]
    LiteralOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{span}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}
impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

fn span_prefix(span: &Option<Span>) -> String {
    span.map(|x| format!("{}: ", x)).unwrap_or_default()
}

/// Scope, type and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", span_prefix(.span), .message)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}
impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        let span = if span.is_valid() { Some(span) } else { None };
        Self {
            message: message.into(),
            span,
        }
    }
    pub fn without_span(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("unsupported SPIR-V version {0}.{1}")]
    UnsupportedSpirvVersion(u32, u32),
    #[error("capability {0:?} is not allowed by the target")]
    UnsupportedCapability(spirv::Capability),
    #[error("GLSL {0} does not support {1}")]
    UnsupportedGlslFeature(String, &'static str),
    #[error("no entry function for stage {0}")]
    MissingEntry(String),
}

/// Returns the source span carried by a pipeline error, if any.
pub fn error_span(err: &anyhow::Error) -> Option<Span> {
    if let Some(e) = err.downcast_ref::<LexError>() {
        return Some(e.span);
    }
    if let Some(e) = err.downcast_ref::<ParseError>() {
        return Some(e.span);
    }
    if let Some(e) = err.downcast_ref::<CompileError>() {
        return e.span;
    }
    None
}
