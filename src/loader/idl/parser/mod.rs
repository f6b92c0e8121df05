//! Recursive descent parser that turns lexer tokens into IDL AST nodes.
//!
//! The token stream is materialised up front so the parser can backtrack over the two
//! ambiguous constructs of the grammar: templated calls (`f<32>(x)` versus `f < 32`) and
//! multi-target assignments (`(a, b) = f()` versus a parenthesised expression).

mod decl;
mod expr;
mod stmt;

use std::path::Path;
use std::sync::Arc;

use crate::idl::ast::{FunctionBody, IdlFile};
use crate::idl::diagnostic::SourceSpan;
use crate::idl::error::{IdlError, IdlResult};

use super::SourceOrigin;
use super::lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    path: Arc<Path>,
}

impl Parser {
    pub fn new(source: &str, origin: &SourceOrigin) -> IdlResult<Self> {
        let tokens =
            Lexer::with_origin(source, origin.path.clone(), origin.line, origin.column).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            path: origin.path.clone(),
        })
    }

    /// Parses a statement list up to end of input.
    pub fn parse_function_body(&mut self) -> IdlResult<FunctionBody> {
        let start = self.peek().clone();
        let mut statements = Vec::new();
        while !self.check(TokenKind::EOF) {
            if self.match_token(TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(FunctionBody {
            statements,
            span: self.span_from(&start),
        })
    }

    pub fn parse_file(&mut self) -> IdlResult<IdlFile> {
        let mut items = Vec::new();
        while !self.check(TokenKind::EOF) {
            items.push(self.parse_item()?);
        }
        Ok(IdlFile { items })
    }

    pub fn parse_standalone_expression(&mut self) -> IdlResult<crate::idl::ast::Expr> {
        let expr = self.parse_expression()?;
        self.expect(TokenKind::EOF, "end of expression")?;
        Ok(expr)
    }

    pub(super) fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub(super) fn peek_at(&self, distance: usize) -> &Token {
        let idx = (self.pos + distance).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(super) fn check_keyword(&self, keyword: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Identifier && token.lexeme == keyword
    }

    pub(super) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.consume();
            true
        } else {
            false
        }
    }

    pub(super) fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.consume();
            true
        } else {
            false
        }
    }

    pub(super) fn consume(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::EOF {
            self.pos += 1;
        }
        token
    }

    pub(super) fn expect(&mut self, kind: TokenKind, context: &str) -> IdlResult<Token> {
        if self.check(kind) {
            Ok(self.consume())
        } else {
            Err(self.unexpected(context))
        }
    }

    pub(super) fn expect_keyword(&mut self, keyword: &str) -> IdlResult<Token> {
        if self.check_keyword(keyword) {
            Ok(self.consume())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    pub(super) fn expect_identifier(&mut self, context: &str) -> IdlResult<String> {
        Ok(self.expect(TokenKind::Identifier, context)?.lexeme)
    }

    pub(super) fn checkpoint(&self) -> usize {
        self.pos
    }

    pub(super) fn rewind(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
    }

    pub(super) fn token_span(&self, token: &Token) -> SourceSpan {
        SourceSpan::new(self.path.clone(), token.start(), token.end)
    }

    /// Span from `start` through the most recently consumed token.
    pub(super) fn span_from(&self, start: &Token) -> SourceSpan {
        let end = if self.pos == 0 {
            start.end
        } else {
            self.tokens[self.pos - 1].end
        };
        SourceSpan::new(self.path.clone(), start.start(), end.max(start.start()))
    }

    pub(super) fn error_here(&self, code: &'static str, message: impl Into<String>) -> IdlError {
        IdlError::parse(code, message, Some(self.token_span(self.peek())))
    }

    pub(super) fn unexpected(&self, context: &str) -> IdlError {
        let token = self.peek();
        let found = if token.kind == TokenKind::EOF {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        self.error_here(
            "parser.unexpected-token",
            format!("expected {context}, found {found}"),
        )
    }
}

#[cfg(test)]
mod tests;
