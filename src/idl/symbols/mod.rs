//! Scoped symbol tables.
//!
//! A table is a stack of scopes over one global scope that is built per architecture and
//! configuration, then frozen and shared between every clone.

mod builder;
mod symbol;
mod table;

pub use builder::XREG_COUNT;
pub use symbol::{Symbol, VarOrigin, Variable};
pub use table::SymbolTable;
