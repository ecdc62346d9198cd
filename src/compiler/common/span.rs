use std::fmt;

/// 1-based line/column position in source text. Line 0 marks a synthesized
/// location with no source counterpart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}
impl LineColumn {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Inclusive `[start, end]` source range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: LineColumn,
    pub end: LineColumn,
}
impl Span {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: LineColumn::new(start_line, start_column),
            end: LineColumn::new(end_line, end_column),
        }
    }

    pub fn call_site() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.start.line != 0
    }

    pub fn to(&self, other: Span) -> Span {
        Span::join([*self, other])
    }

    pub fn join<I: IntoIterator<Item = Span>>(spans: I) -> Self {
        let mut builder = SpanBuilder::new();
        for span in spans {
            builder.push(span);
        }
        builder.into()
    }
}
impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

pub struct SpanBuilder {
    inner: Option<Span>,
}
impl SpanBuilder {
    pub fn new() -> Self {
        Self { inner: None }
    }

    pub fn push(&mut self, span: Span) {
        if !span.is_valid() {
            return;
        }
        if let Some(inner) = self.inner.as_mut() {
            inner.start = inner.start.min(span.start);
            inner.end = inner.end.max(span.end);
        } else {
            self.inner = Some(span);
        }
    }
}
impl Default for SpanBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl From<SpanBuilder> for Span {
    fn from(builder: SpanBuilder) -> Span {
        builder.inner.unwrap_or(Span::call_site())
    }
}
