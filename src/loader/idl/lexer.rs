//! Tokenizer for IDL source fragments.
//!
//! Fragments embedded in architecture records are lexed with an origin so that reported
//! positions point into the enclosing file rather than at line 1 of the fragment.

use std::path::Path;
use std::sync::Arc;

use crate::idl::ast::{Literal, LiteralWidth};
use crate::idl::diagnostic::{SourcePosition, SourceSpan};
use crate::idl::error::IdlError;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    pub end: SourcePosition,
    /// `#` comments seen since the previous token, without the marker.
    pub comments: Vec<String>,
}

impl Token {
    pub fn start(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    /// Verbatim contents of a `description { ... }` block.
    RawBlock,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
    ShiftLeft,
    ShiftRight,
    ShiftRightArith,
    Equals,
    DoubleEquals,
    BangEquals,
    Bang,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Asterisk,
    Slash,
    Percent,
    Caret,
    Ampersand,
    DoubleAmpersand,
    Pipe,
    DoublePipe,
    Tilde,
    Question,
    Colon,
    DoubleColon,
    Comma,
    Semicolon,
    Dot,
    WidePlus,
    WideMinus,
    WideStar,
    WideShiftLeft,
    EOF,
}

#[derive(Clone, Copy)]
enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl Radix {
    fn accepts(self, ch: char) -> bool {
        match self {
            Radix::Binary => matches!(ch, '0' | '1'),
            Radix::Octal => matches!(ch, '0'..='7'),
            Radix::Decimal => ch.is_ascii_digit(),
            Radix::Hex => ch.is_ascii_hexdigit(),
        }
    }

    fn base(self) -> u32 {
        match self {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Decimal => 10,
            Radix::Hex => 16,
        }
    }

    fn from_letter(ch: char) -> Option<Radix> {
        match ch.to_ascii_lowercase() {
            'b' => Some(Radix::Binary),
            'o' => Some(Radix::Octal),
            'd' => Some(Radix::Decimal),
            'h' => Some(Radix::Hex),
            _ => None,
        }
    }
}

pub struct Lexer<'src> {
    src: &'src str,
    path: Arc<Path>,
    offset: usize,
    line: usize,
    column: usize,
    pending_comments: Vec<String>,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str, path: Arc<Path>) -> Self {
        Self::with_origin(src, path, 1, 0)
    }

    /// Lexer whose first character sits at `line`, after `column` characters.
    pub fn with_origin(src: &'src str, path: Arc<Path>, line: usize, column: usize) -> Self {
        Self {
            src,
            path,
            offset: 0,
            line: line.max(1),
            column,
            pending_comments: Vec::new(),
        }
    }

    pub fn path(&self) -> &Arc<Path> {
        &self.path
    }

    /// Lexes the whole input; the last token is always `EOF`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, IdlError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::EOF;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Produces the next token.
    pub fn next_token(&mut self) -> Result<Token, IdlError> {
        self.skip_ignorable();
        let Some(ch) = self.peek_char() else {
            let (line, column) = self.position();
            return Ok(self.make_token(TokenKind::EOF, String::new(), line, column));
        };
        let next = self.peek_next_char();

        match ch {
            '{' => Ok(self.consume_fixed(TokenKind::LBrace, 1)),
            '}' => Ok(self.consume_fixed(TokenKind::RBrace, 1)),
            '(' => Ok(self.consume_fixed(TokenKind::LParen, 1)),
            ')' => Ok(self.consume_fixed(TokenKind::RParen, 1)),
            '[' => Ok(self.consume_fixed(TokenKind::LBracket, 1)),
            ']' => Ok(self.consume_fixed(TokenKind::RBracket, 1)),
            ',' => Ok(self.consume_fixed(TokenKind::Comma, 1)),
            ';' => Ok(self.consume_fixed(TokenKind::Semicolon, 1)),
            '.' => Ok(self.consume_fixed(TokenKind::Dot, 1)),
            '?' => Ok(self.consume_fixed(TokenKind::Question, 1)),
            '~' => Ok(self.consume_fixed(TokenKind::Tilde, 1)),
            '^' => Ok(self.consume_fixed(TokenKind::Caret, 1)),
            '*' => Ok(self.consume_fixed(TokenKind::Asterisk, 1)),
            '/' => Ok(self.consume_fixed(TokenKind::Slash, 1)),
            '%' => Ok(self.consume_fixed(TokenKind::Percent, 1)),
            ':' if next == Some(':') => Ok(self.consume_fixed(TokenKind::DoubleColon, 2)),
            ':' => Ok(self.consume_fixed(TokenKind::Colon, 1)),
            '=' if next == Some('=') => Ok(self.consume_fixed(TokenKind::DoubleEquals, 2)),
            '=' => Ok(self.consume_fixed(TokenKind::Equals, 1)),
            '!' if next == Some('=') => Ok(self.consume_fixed(TokenKind::BangEquals, 2)),
            '!' => Ok(self.consume_fixed(TokenKind::Bang, 1)),
            '+' if next == Some('+') => Ok(self.consume_fixed(TokenKind::PlusPlus, 2)),
            '+' => Ok(self.consume_fixed(TokenKind::Plus, 1)),
            '-' if next == Some('-') => Ok(self.consume_fixed(TokenKind::MinusMinus, 2)),
            '-' => Ok(self.consume_fixed(TokenKind::Minus, 1)),
            '&' if next == Some('&') => Ok(self.consume_fixed(TokenKind::DoubleAmpersand, 2)),
            '&' => Ok(self.consume_fixed(TokenKind::Ampersand, 1)),
            '|' if next == Some('|') => Ok(self.consume_fixed(TokenKind::DoublePipe, 2)),
            '|' => Ok(self.consume_fixed(TokenKind::Pipe, 1)),
            '<' if next == Some('<') => Ok(self.consume_fixed(TokenKind::ShiftLeft, 2)),
            '<' if next == Some('=') => Ok(self.consume_fixed(TokenKind::LessEquals, 2)),
            '<' => Ok(self.consume_fixed(TokenKind::LessThan, 1)),
            '>' => Ok(self.consume_greater()),
            '`' => self.consume_widening(),
            '"' => self.consume_string(),
            ch if ch.is_ascii_digit() => self.consume_number(),
            ch if is_ident_start(ch) => self.consume_identifier(),
            _ => {
                let message = format!("unexpected character '{ch}'");
                let err = self.lexer_error_here("lexer.unexpected-char", message);
                self.advance_char();
                Err(err)
            }
        }
    }

    fn consume_greater(&mut self) -> Token {
        let rest = &self.src[self.offset..];
        if rest.starts_with(">>>") {
            self.consume_fixed(TokenKind::ShiftRightArith, 3)
        } else if rest.starts_with(">>") {
            self.consume_fixed(TokenKind::ShiftRight, 2)
        } else if rest.starts_with(">=") {
            self.consume_fixed(TokenKind::GreaterEquals, 2)
        } else {
            self.consume_fixed(TokenKind::GreaterThan, 1)
        }
    }

    fn consume_widening(&mut self) -> Result<Token, IdlError> {
        let rest = &self.src[self.offset..];
        if rest.starts_with("`<<") {
            Ok(self.consume_fixed(TokenKind::WideShiftLeft, 3))
        } else if rest.starts_with("`+") {
            Ok(self.consume_fixed(TokenKind::WidePlus, 2))
        } else if rest.starts_with("`-") {
            Ok(self.consume_fixed(TokenKind::WideMinus, 2))
        } else if rest.starts_with("`*") {
            Ok(self.consume_fixed(TokenKind::WideStar, 2))
        } else {
            Err(self.lexer_error_here(
                "lexer.widening-operator",
                "'`' must introduce one of `+, `-, `*, `<<",
            ))
        }
    }

    fn consume_identifier(&mut self) -> Result<Token, IdlError> {
        let start = self.offset;
        let (line, column) = self.position();
        self.advance_char();
        while let Some(ch) = self.peek_char() {
            if is_ident_part(ch) {
                self.advance_char();
            } else {
                break;
            }
        }
        // `implemented?(...)`: a trailing '?' belongs to the name only when a call follows.
        if self.peek_char() == Some('?') && self.peek_next_char() == Some('(') {
            self.advance_char();
        }
        if self.peek_char() == Some('\'') && self.starts_sized_literal() {
            return self.consume_sized_tail(start, line, column);
        }
        let token = self.make_token_from_span(TokenKind::Identifier, start, self.offset, line, column);
        if token.lexeme == "description" {
            if let Some(raw) = self.try_consume_raw_block()? {
                return Ok(Token {
                    kind: TokenKind::RawBlock,
                    lexeme: raw,
                    ..token
                });
            }
        }
        Ok(token)
    }

    fn consume_number(&mut self) -> Result<Token, IdlError> {
        let start = self.offset;
        let (line, column) = self.position();
        let mut radix = Radix::Decimal;
        let mut digits_consumed = 0usize;
        let mut require_digit = false;

        if self.peek_char() == Some('0') {
            self.advance_char();
            digits_consumed += 1;
            if let Some(next) = self.peek_char() {
                let prefixed = match next {
                    'x' | 'X' => Some(Radix::Hex),
                    'b' | 'B' => Some(Radix::Binary),
                    'o' | 'O' => Some(Radix::Octal),
                    _ => None,
                };
                if let Some(prefixed) = prefixed {
                    radix = prefixed;
                    self.advance_char();
                    digits_consumed = 0;
                    require_digit = true;
                }
            }
        }

        self.consume_digits(radix, &mut digits_consumed);

        if require_digit && digits_consumed == 0 {
            return Err(self.emit_lexer_diagnostic(
                "lexer.number.missing-digits",
                "numeric literal requires digits after prefix",
                line,
                column,
            ));
        }

        if matches!(radix, Radix::Decimal) && self.peek_char() == Some('\'') {
            if !self.starts_sized_literal() {
                return Err(self.emit_lexer_diagnostic(
                    "lexer.number.base",
                    "sized literal requires a base of b, o, d or h",
                    line,
                    column,
                ));
            }
            return self.consume_sized_tail(start, line, column);
        }

        if self.peek_char().is_some_and(is_ident_start) {
            return Err(self.emit_lexer_diagnostic(
                "lexer.number.suffix",
                "unexpected character after numeric literal",
                line,
                column,
            ));
        }

        Ok(self.make_token_from_span(TokenKind::Number, start, self.offset, line, column))
    }

    /// `'` followed by an optional `s` and a base letter.
    fn starts_sized_literal(&self) -> bool {
        let mut chars = self.src[self.offset..].chars();
        if chars.next() != Some('\'') {
            return false;
        }
        match chars.next() {
            Some('s' | 'S') => chars.next().and_then(Radix::from_letter).is_some(),
            Some(ch) => Radix::from_letter(ch).is_some(),
            None => false,
        }
    }

    fn consume_sized_tail(&mut self, start: usize, line: usize, column: usize) -> Result<Token, IdlError> {
        self.advance_char(); // '\''
        if matches!(self.peek_char(), Some('s' | 'S')) {
            self.advance_char();
        }
        let radix = self
            .peek_char()
            .and_then(Radix::from_letter)
            .unwrap_or(Radix::Decimal);
        self.advance_char();
        let mut digits = 0usize;
        self.consume_digits(radix, &mut digits);
        if digits == 0 {
            return Err(self.emit_lexer_diagnostic(
                "lexer.number.missing-digits",
                "sized literal requires digits after the base",
                line,
                column,
            ));
        }
        Ok(self.make_token_from_span(TokenKind::Number, start, self.offset, line, column))
    }

    fn consume_digits(&mut self, radix: Radix, digits: &mut usize) {
        while let Some(ch) = self.peek_char() {
            if ch == '_' {
                self.advance_char();
                continue;
            }
            if radix.accepts(ch) {
                self.advance_char();
                *digits += 1;
            } else {
                break;
            }
        }
    }

    fn consume_string(&mut self) -> Result<Token, IdlError> {
        let (start_line, start_col) = self.position();
        self.advance_char(); // opening quote
        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                '"' => {
                    self.advance_char();
                    return Ok(self.make_token(TokenKind::String, value, start_line, start_col));
                }
                '\\' => {
                    self.advance_char();
                    let Some(escaped) = self.peek_char() else {
                        break;
                    };
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                    self.advance_char();
                }
                '\n' => {
                    let (line, column) = self.position();
                    return Err(self.emit_lexer_diagnostic(
                        "lexer.string.unterminated",
                        "unterminated string literal",
                        line,
                        column,
                    ));
                }
                other => {
                    value.push(other);
                    self.advance_char();
                }
            }
        }
        Err(self.emit_lexer_diagnostic(
            "lexer.string.unterminated",
            "unterminated string literal",
            start_line,
            start_col,
        ))
    }

    /// Captures `{ ... }` after `description` verbatim, honoring nested braces.
    fn try_consume_raw_block(&mut self) -> Result<Option<String>, IdlError> {
        let rest = &self.src[self.offset..];
        let trimmed = rest.trim_start();
        if !trimmed.starts_with('{') {
            return Ok(None);
        }
        let (line, column) = self.position();
        while self.peek_char() != Some('{') {
            self.advance_char();
        }
        self.advance_char();
        let body_start = self.offset;
        let mut depth = 1usize;
        while let Some(ch) = self.peek_char() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.src[body_start..self.offset].trim().to_string();
                        self.advance_char();
                        return Ok(Some(body));
                    }
                }
                _ => {}
            }
            self.advance_char();
        }
        Err(self.emit_lexer_diagnostic(
            "lexer.description.unterminated",
            "unterminated description block",
            line,
            column,
        ))
    }

    fn consume_fixed(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.offset;
        let (line, column) = self.position();
        for _ in 0..len {
            self.advance_char();
        }
        self.make_token_from_span(kind, start, self.offset, line, column)
    }

    fn skip_ignorable(&mut self) {
        loop {
            self.skip_whitespace();
            if let Some('#') = self.peek_char() {
                self.consume_line_comment();
            } else {
                break;
            }
        }
    }

    fn consume_line_comment(&mut self) {
        self.advance_char(); // '#'
        let start = self.offset;
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
        let text = self.src[start..self.offset].trim().to_string();
        self.pending_comments.push(text);
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.src[self.offset..].chars();
        iter.next()?;
        iter.next()
    }

    fn advance_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        } else {
            self.offset = self.src.len();
        }
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.column + 1)
    }

    fn make_token(&mut self, kind: TokenKind, lexeme: String, line: usize, column: usize) -> Token {
        let (end_line, end_column) = self.position();
        Token {
            kind,
            lexeme,
            line,
            column,
            end: SourcePosition::new(end_line, end_column),
            comments: std::mem::take(&mut self.pending_comments),
        }
    }

    fn make_token_from_span(
        &mut self,
        kind: TokenKind,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Token {
        let slice = self.src[start..end].to_string();
        self.make_token(kind, slice, line, column)
    }

    fn emit_lexer_diagnostic(
        &self,
        code: &'static str,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> IdlError {
        let span = SourceSpan::point(self.path.clone(), SourcePosition::new(line, column));
        IdlError::lexer(code, message, span)
    }

    fn lexer_error_here(&self, code: &'static str, message: impl Into<String>) -> IdlError {
        let (line, column) = self.position();
        self.emit_lexer_diagnostic(code, message, line, column)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Decodes a `Number` token into a literal.
pub fn parse_literal(lexeme: &str) -> Result<Literal, String> {
    let Some((size, tail)) = lexeme.split_once('\'') else {
        return parse_plain(lexeme).map(|value| Literal {
            value,
            width: None,
            signed: false,
            text: lexeme.to_string(),
        });
    };

    let (signed, tail) = match tail.strip_prefix(|ch: char| ch == 's' || ch == 'S') {
        Some(rest) => (true, rest),
        None => (false, tail),
    };
    let mut chars = tail.chars();
    let radix = chars
        .next()
        .and_then(Radix::from_letter)
        .ok_or_else(|| format!("missing base in '{lexeme}'"))?;
    let value = parse_digits(chars.as_str(), radix)?;

    let width = if size.chars().all(|ch| ch.is_ascii_digit()) {
        let width: u32 = size
            .parse()
            .map_err(|_| format!("invalid literal width '{size}'"))?;
        if width == 0 {
            return Err(format!("literal '{lexeme}' has zero width"));
        }
        if width < 128 && value >> width != 0 {
            return Err(format!("value of '{lexeme}' does not fit in {width} bits"));
        }
        LiteralWidth::Fixed(width)
    } else {
        LiteralWidth::Param(size.to_string())
    };

    Ok(Literal {
        value,
        width: Some(width),
        signed,
        text: lexeme.to_string(),
    })
}

fn parse_plain(lexeme: &str) -> Result<u128, String> {
    let lower = lexeme.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("0x") {
        parse_digits(rest, Radix::Hex)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        parse_digits(rest, Radix::Binary)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        parse_digits(rest, Radix::Octal)
    } else {
        parse_digits(&lower, Radix::Decimal)
    }
}

fn parse_digits(digits: &str, radix: Radix) -> Result<u128, String> {
    let cleaned: String = digits.chars().filter(|ch| *ch != '_').collect();
    u128::from_str_radix(&cleaned, radix.base())
        .map_err(|err| format!("invalid numeric literal '{digits}': {err}"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::{Lexer, LiteralWidth, TokenKind, parse_literal};

    fn make_lexer(src: &str) -> Lexer<'_> {
        Lexer::new(src, Arc::from(Path::new("<test>")))
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        make_lexer(src)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_operators_greedily() {
        let stream = kinds("a >>> 1 >> 2 >= b `<< c `+ d != e");
        assert_eq!(
            stream,
            vec![
                TokenKind::Identifier,
                TokenKind::ShiftRightArith,
                TokenKind::Number,
                TokenKind::ShiftRight,
                TokenKind::Number,
                TokenKind::GreaterEquals,
                TokenKind::Identifier,
                TokenKind::WideShiftLeft,
                TokenKind::Identifier,
                TokenKind::WidePlus,
                TokenKind::Identifier,
                TokenKind::BangEquals,
                TokenKind::Identifier,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn question_mark_joins_identifier_only_before_call() {
        let stream = kinds("implemented?(x) c ? a : b");
        assert_eq!(stream[0], TokenKind::Identifier);
        assert_eq!(stream[1], TokenKind::LParen);
        assert_eq!(stream[5], TokenKind::Question, "ternary keeps its own token");
    }

    #[test]
    fn sized_literals_lex_as_single_numbers() {
        let tokens = make_lexer("XLEN'b0 32'sh_ff 4'd9").tokenize().expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "XLEN'b0");
        assert_eq!(tokens[1].lexeme, "32'sh_ff");
        assert_eq!(tokens[2].lexeme, "4'd9");
    }

    #[test]
    fn decodes_literal_values() {
        let param = parse_literal("XLEN'b0").expect("literal");
        assert_eq!(param.width, Some(LiteralWidth::Param("XLEN".into())));
        let signed = parse_literal("8'sh_f0").expect("literal");
        assert!(signed.signed);
        assert_eq!(signed.value, 0xf0);
        assert_eq!(parse_literal("0x1_0").expect("hex").value, 16);
        assert!(parse_literal("2'b111").is_err(), "value wider than its size");
    }

    #[test]
    fn comments_attach_to_the_next_token() {
        let tokens = make_lexer("# first\n# second\nx = 1;").tokenize().expect("tokenize");
        assert_eq!(tokens[0].comments, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn origin_offsets_positions() {
        let mut lexer = Lexer::with_origin("x\n  y", Arc::from(Path::new("csr.toml")), 40, 4);
        let first = lexer.next_token().expect("x");
        assert_eq!((first.line, first.column), (40, 5));
        let second = lexer.next_token().expect("y");
        assert_eq!((second.line, second.column), (41, 3));
    }

    #[test]
    fn description_blocks_are_raw() {
        let tokens = make_lexer("description { Raises {an} exception. } body")
            .tokenize()
            .expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::RawBlock);
        assert_eq!(tokens[0].lexeme, "Raises {an} exception.");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = make_lexer("a @ b").tokenize().unwrap_err();
        let diag = err.diagnostic().expect("diagnostic");
        assert_eq!(diag.code, "lexer.unexpected-char");
    }
}
