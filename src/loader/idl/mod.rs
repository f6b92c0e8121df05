//! IDL source loading: lexer, parser and the parse entry points used by the compiler.

pub mod lexer;
pub mod parser;

use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::idl::ast::{Expr, FunctionBody, IdlFile};
use crate::idl::error::IdlResult;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

/// Where a fragment starts inside its enclosing file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceOrigin {
    pub path: Arc<Path>,
    pub line: usize,
    pub column: usize,
}

impl SourceOrigin {
    pub fn new(path: impl AsRef<Path>, line: usize) -> Self {
        Self {
            path: Arc::from(path.as_ref()),
            line,
            column: 0,
        }
    }

    /// Origin for ad-hoc snippets such as tests or command line input.
    pub fn inline(name: &str) -> Self {
        Self::new(name, 1)
    }
}

/// What a source string is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseTarget {
    Expression,
    FunctionBody,
    Declarations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Expression(Expr),
    FunctionBody(FunctionBody),
    Declarations(IdlFile),
}

pub fn parse(source: &str, origin: &SourceOrigin, target: ParseTarget) -> IdlResult<Parsed> {
    trace!(path = %origin.path.display(), line = origin.line, ?target, "parsing IDL fragment");
    let mut parser = Parser::new(source, origin)?;
    match target {
        ParseTarget::Expression => parser.parse_standalone_expression().map(Parsed::Expression),
        ParseTarget::FunctionBody => parser.parse_function_body().map(Parsed::FunctionBody),
        ParseTarget::Declarations => parser.parse_file().map(Parsed::Declarations),
    }
}

pub fn parse_expression(source: &str, origin: &SourceOrigin) -> IdlResult<Expr> {
    Parser::new(source, origin)?.parse_standalone_expression()
}

pub fn parse_function_body(source: &str, origin: &SourceOrigin) -> IdlResult<FunctionBody> {
    Parser::new(source, origin)?.parse_function_body()
}

pub fn parse_declarations(source: &str, origin: &SourceOrigin) -> IdlResult<IdlFile> {
    Parser::new(source, origin)?.parse_file()
}
