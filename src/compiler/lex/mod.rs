//! Source text to token stream.
use std::fmt;

use super::common::{LineColumn, Span};
use super::error::{LexError, LexErrorKind};


macro_rules! define_tokens {
    (
        keywords { $($kw:literal => $kw_name:ident,)+ }
        puncts { $($punct:literal => $punct_name:ident,)+ }
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum TokenKind {
            Identifier(String),
            IntLiteral(i64),
            FloatLiteral(f64),
            StringLiteral(String),
            $($kw_name,)+
            $($punct_name,)+
            EndOfStream,
        }
        impl TokenKind {
            fn keyword(name: &str) -> Option<TokenKind> {
                match name {
                    $($kw => Some(TokenKind::$kw_name),)+
                    _ => None,
                }
            }
            /// Source spelling of keyword and punctuation tokens.
            pub fn spelling(&self) -> Option<&'static str> {
                match self {
                    $(TokenKind::$kw_name => Some($kw),)+
                    $(TokenKind::$punct_name => Some($punct),)+
                    _ => None,
                }
            }
        }
        // Longest spellings first so `->` wins over `-`.
        const PUNCTS: &[(&str, TokenKind)] = &[
            $(($punct, TokenKind::$punct_name),)+
        ];
    };
}

define_tokens! {
    keywords {
        "alias" => Alias,
        "const" => Const,
        "const_select" => ConstSelect,
        "discard" => Discard,
        "else" => Else,
        "external" => External,
        "false" => False,
        "fn" => Fn,
        "if" => If,
        "import" => Import,
        "let" => Let,
        "module" => Module,
        "option" => Option,
        "return" => Return,
        "struct" => Struct,
        "true" => True,
    }
    puncts {
        "->" => Arrow,
        "&&" => LogicalAnd,
        "||" => LogicalOr,
        "==" => Equal,
        "!=" => NotEqual,
        "<=" => LessThanEqual,
        ">=" => GreaterThanEqual,
        "+=" => PlusAssign,
        "-=" => MinusAssign,
        "*=" => MultiplyAssign,
        "/=" => DivideAssign,
        "=" => Assign,
        "<" => LessThan,
        ">" => GreaterThan,
        "+" => Plus,
        "-" => Minus,
        "*" => Multiply,
        "/" => Divide,
        "!" => Not,
        ":" => Colon,
        ";" => Semicolon,
        "," => Comma,
        "." => Dot,
        "{" => OpenCurlyBracket,
        "}" => ClosingCurlyBracket,
        "[" => OpenSquareBracket,
        "]" => ClosingSquareBracket,
        "(" => OpenParenthesis,
        ")" => ClosingParenthesis,
    }
}
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(x) => write!(f, "identifier `{}`", x),
            TokenKind::IntLiteral(x) => write!(f, "integer `{}`", x),
            TokenKind::FloatLiteral(x) => write!(f, "float `{}`", x),
            TokenKind::StringLiteral(x) => write!(f, "string {:?}", x),
            TokenKind::EndOfStream => f.write_str("end of stream"),
            x => write!(f, "`{}`", x.spelling().unwrap_or("?")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    text: &'a str,
}
impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            text,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }
    fn location(&self) -> LineColumn {
        LineColumn::new(self.line, self.column)
    }
    /// Location of the last consumed character.
    fn last_location(&self) -> LineColumn {
        LineColumn::new(self.line, self.column.saturating_sub(1).max(1))
    }
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
    fn starts_with(&self, s: &str) -> bool {
        let mut i = 0;
        for c in s.chars() {
            if self.peek_at(i) != Some(c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        if self.starts_with("*/") {
                            self.bump();
                            self.bump();
                            break;
                        }
                        if self.bump().is_none() {
                            let span = Span { start, end: self.last_location() };
                            return Err(LexError::new(LexErrorKind::UnrecognizedToken, span));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.location();
        let begin = self.pos;

        let is_hex = self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        let mut is_float = false;
        if is_hex {
            self.bump();
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                self.bump();
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let exp_digits = match self.peek_at(1) {
                    Some('+' | '-') => 2,
                    _ => 1,
                };
                if matches!(self.peek_at(exp_digits), Some(c) if c.is_ascii_digit()) {
                    is_float = true;
                    for _ in 0..exp_digits {
                        self.bump();
                    }
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        self.bump();
                    }
                }
            }
        }

        // Trailing identifier characters make the whole run malformed.
        if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.') {
                self.bump();
            }
            let span = Span { start, end: self.last_location() };
            return Err(LexError::new(LexErrorKind::BadNumber, span));
        }

        let text = self.chars[begin..self.pos].iter().collect::<String>();
        let span = Span { start, end: self.last_location() };
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::new(LexErrorKind::BadNumber, span))?;
            return Ok(TokenKind::FloatLiteral(value));
        }

        let parsed = if is_hex {
            if text.len() <= 2 {
                return Err(LexError::new(LexErrorKind::BadNumber, span));
            }
            i64::from_str_radix(&text[2..], 16)
        } else {
            text.parse::<i64>()
        };
        match parsed {
            Ok(x) => Ok(TokenKind::IntLiteral(x)),
            Err(e) => {
                use std::num::IntErrorKind;
                let kind = match e.kind() {
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                        LexErrorKind::NumberOutOfRange
                    }
                    _ => LexErrorKind::BadNumber,
                };
                Err(LexError::new(kind, span))
            }
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        let start = self.location();
        self.bump();
        let mut out = String::new();
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    let span = Span { start, end: self.last_location() };
                    return Err(LexError::new(LexErrorKind::UnfinishedString, span));
                }
                Some('"') => {
                    self.bump();
                    return Ok(TokenKind::StringLiteral(out));
                }
                Some('\\') => {
                    let escape_start = self.location();
                    self.bump();
                    let c = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(c) if c != '\n' => {
                            let span = Span { start: escape_start, end: self.location() };
                            return Err(LexError::new(LexErrorKind::UnrecognizedChar(c), span));
                        }
                        _ => {
                            let span = Span { start, end: self.last_location() };
                            return Err(LexError::new(LexErrorKind::UnfinishedString, span));
                        }
                    };
                    self.bump();
                    out.push(c);
                }
                Some(c) => {
                    self.bump();
                    out.push(c);
                }
            }
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::keyword(&name).unwrap_or(TokenKind::Identifier(name))
    }

    fn lex_punct(&mut self) -> Result<TokenKind, LexError> {
        for (spelling, kind) in PUNCTS {
            if self.starts_with(spelling) {
                for _ in 0..spelling.chars().count() {
                    self.bump();
                }
                return Ok(kind.clone());
            }
        }
        let start = self.location();
        self.bump();
        let span = Span { start, end: start };
        Err(LexError::new(LexErrorKind::UnrecognizedToken, span))
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let start = self.location();
        let kind = match self.peek() {
            None => {
                let span = Span { start, end: start };
                return Ok(Token { kind: TokenKind::EndOfStream, span });
            }
            Some(c) if c.is_ascii_digit() => self.lex_number()?,
            Some('.') if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) => {
                self.lex_number()?
            }
            Some('"') => self.lex_string()?,
            Some(c) if c.is_alphabetic() || c == '_' => self.lex_identifier(),
            Some(_) => self.lex_punct()?,
        };
        let span = Span { start, end: self.last_location() };
        Ok(Token { kind, span })
    }
}

/// Splits `text` into tokens. The returned stream always ends with
/// `EndOfStream`.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(text);
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let end = token.kind == TokenKind::EndOfStream;
        out.push(token);
        if end {
            break;
        }
    }
    tracing::trace!(count = out.len(), bytes = lexer.text.len(), "tokenized source");
    Ok(out)
}
