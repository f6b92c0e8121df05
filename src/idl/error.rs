use thiserror::Error;

use crate::idl::diagnostic::{DiagnosticPhase, IdlDiagnostic, SourceSpan};

/// Failures raised by symbol table operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol '{0}' is already defined in this scope")]
    Duplicate(String),
    #[error("symbol '{0}' is not defined")]
    Undefined(String),
    #[error("cannot add '{0}': scope is frozen")]
    Frozen(String),
    #[error("cannot assign to constant '{0}'")]
    ConstAssignment(String),
}

/// Represents any failure that can occur while parsing, checking, pruning, or analysing IDL.
#[derive(Debug, Error)]
pub enum IdlError {
    #[error("{0}")]
    Parse(Box<IdlDiagnostic>),
    #[error("{error}{}", located(.span))]
    Symbol {
        error: SymbolError,
        span: Option<SourceSpan>,
    },
    #[error("{0}")]
    Type(Box<IdlDiagnostic>),
    #[error("internal compiler error: {0}")]
    Internal(String),
    #[error("architecture error: {0}")]
    Architecture(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl IdlError {
    pub fn parse(code: &'static str, message: impl Into<String>, span: Option<SourceSpan>) -> Self {
        IdlError::Parse(Box::new(IdlDiagnostic::error(
            DiagnosticPhase::Parser,
            code,
            message,
            span,
        )))
    }

    pub fn lexer(code: &'static str, message: impl Into<String>, span: SourceSpan) -> Self {
        IdlError::Parse(Box::new(IdlDiagnostic::error(
            DiagnosticPhase::Lexer,
            code,
            message,
            Some(span),
        )))
    }

    pub fn type_error(code: &'static str, message: impl Into<String>, span: &SourceSpan) -> Self {
        IdlError::Type(Box::new(IdlDiagnostic::error(
            DiagnosticPhase::TypeCheck,
            code,
            message,
            Some(span.clone()),
        )))
    }

    pub fn symbol(error: SymbolError, span: &SourceSpan) -> Self {
        IdlError::Symbol {
            error,
            span: Some(span.clone()),
        }
    }

    /// Diagnostic payload for parse and type errors.
    pub fn diagnostic(&self) -> Option<&IdlDiagnostic> {
        match self {
            IdlError::Parse(diag) | IdlError::Type(diag) => Some(diag),
            _ => None,
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, IdlError::Type(_))
    }
}

impl From<SymbolError> for IdlError {
    fn from(error: SymbolError) -> Self {
        IdlError::Symbol { error, span: None }
    }
}

pub type IdlResult<T> = Result<T, IdlError>;

fn located(span: &Option<SourceSpan>) -> String {
    span.as_ref()
        .map(|span| format!(" @ {span}"))
        .unwrap_or_default()
}
