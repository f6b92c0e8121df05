//! IDL semantics: types, values, symbols and the passes that run over parsed fragments.

pub mod analysis;
pub mod ast;
pub mod codegen;
pub mod diagnostic;
pub mod error;
pub mod eval;
pub mod prune;
pub mod symbols;
pub mod typeck;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

pub use diagnostic::{DiagnosticLevel, DiagnosticPhase, IdlDiagnostic, SourcePosition, SourceSpan};
pub use error::{IdlError, IdlResult, SymbolError};
