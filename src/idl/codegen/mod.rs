//! Backends that lower checked fragments to text.
//!
//! Both trust the annotations on the tree. Neither prunes nor checks; an unannotated node is a
//! caller bug and surfaces as `IdlError::Internal`.

pub mod adoc;
pub mod cpp;

use crate::idl::diagnostic::SourceSpan;
use crate::idl::error::IdlError;

pub use adoc::{AdocStyle, emit_adoc};
pub use cpp::{cpp_type, emit_cpp};

fn untyped(span: &SourceSpan) -> IdlError {
    IdlError::Internal(format!("code generation reached an unchecked node at {span}"))
}

/// Identifier for an IDL function name; `?` is not valid in C-family identifiers.
pub fn function_name(name: &str) -> String {
    match name.strip_suffix('?') {
        Some(stem) => format!("{stem}_Q"),
        None => name.to_string(),
    }
}
