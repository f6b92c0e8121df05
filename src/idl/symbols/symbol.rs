//! Bindings stored in symbol table scopes.

use std::fmt;
use std::sync::Arc;

use crate::idl::ast::FunctionDecl;
use crate::idl::types::Type;
use crate::idl::value::Value;

/// Where a variable binding came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarOrigin {
    Local,
    Global,
    Parameter,
    /// Instruction encoding field such as `rs1`.
    DecodeField,
    /// Architecture parameter such as `MXLEN`.
    ArchParam,
    /// The `X` general purpose register file.
    RegisterFile,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub ty: Type,
    /// Known compile-time value, if any.
    pub value: Option<Value>,
    pub mutable: bool,
    pub origin: VarOrigin,
}

impl Variable {
    pub fn new(ty: Type, origin: VarOrigin) -> Self {
        Self {
            ty,
            value: None,
            mutable: true,
            origin,
        }
    }

    pub fn local(ty: Type) -> Self {
        Self::new(ty, VarOrigin::Local)
    }

    /// Immutable binding with a known value.
    pub fn constant(ty: Type, value: Value, origin: VarOrigin) -> Self {
        Self {
            ty,
            value: Some(value),
            mutable: false,
            origin,
        }
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    Variable(Variable),
    /// Type name: enums, bitfields, structs and aliases such as `XReg`.
    Type(Type),
    Function(Arc<FunctionDecl>),
}

impl Symbol {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Symbol::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Variable(_) => "variable",
            Symbol::Type(_) => "type",
            Symbol::Function(_) => "function",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Variable(var) => {
                write!(f, "{:?} {}", var.origin, var.ty)?;
                if !var.mutable {
                    f.write_str(" const")?;
                }
                if let Some(value) = &var.value {
                    write!(f, " = {value}")?;
                }
                Ok(())
            }
            Symbol::Type(ty) => write!(f, "type {ty}"),
            Symbol::Function(decl) => write!(f, "function {}", decl.name),
        }
    }
}
