//! Bit-precise type checking.
//!
//! The checker walks a parsed fragment, resolves every name against a [`SymbolTable`], and
//! annotates each expression (and each statement) in place. Nothing is allocated in the tree.
//! Scopes opened while checking are always closed again, including on the error path.

mod assign;
mod expr;
mod stmt;


use crate::idl::ast::{Expr, FunctionBody, FunctionDecl, Stmt, TypeExpr, TypeRef};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::eval;
use crate::idl::symbols::{SymbolTable, VarOrigin, Variable};
use crate::idl::types::{Qualifiers, Type, Width};
use crate::idl::value::Value;

pub use assign::assignable;

/// What a `return` statement may produce in the fragment being checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    /// Instruction operations: `return` is an error.
    Forbidden,
    Expect(Vec<Type>),
}

impl Returns {
    /// Slot used by CSR `sw_read()` and field `sw_write()` bodies.
    pub fn register_value() -> Self {
        Returns::Expect(vec![Type::bits(128)])
    }
}

pub(crate) struct TypeChecker<'a> {
    symtab: &'a mut SymbolTable,
    returns: Returns,
    /// Global declarations are constants even without an uppercase name.
    global: bool,
}

impl<'a> TypeChecker<'a> {
    fn new(symtab: &'a mut SymbolTable, returns: Returns) -> Self {
        Self {
            symtab,
            returns,
            global: false,
        }
    }

    /// Runs `check` inside a fresh scope that is popped whatever the outcome.
    fn scoped<T>(&mut self, check: impl FnOnce(&mut Self) -> IdlResult<T>) -> IdlResult<T> {
        self.symtab.push();
        let result = check(self);
        self.symtab.pop();
        result
    }
}

/// Checks a standalone expression and returns its type.
pub fn check_expression(expr: &mut Expr, symtab: &mut SymbolTable) -> IdlResult<Type> {
    TypeChecker::new(symtab, Returns::Forbidden).check_expr(expr)
}

/// Checks a fragment body in a new scope on top of whatever `symtab` already binds.
pub fn check_body(body: &mut FunctionBody, symtab: &mut SymbolTable, returns: Returns) -> IdlResult<()> {
    let mut checker = TypeChecker::new(symtab, returns);
    checker.scoped(|checker| checker.check_block(&mut body.statements))
}

/// Checks a function definition with its template and formal parameters bound.
pub fn check_function(decl: &mut FunctionDecl, symtab: &mut SymbolTable) -> IdlResult<()> {
    symtab.push();
    let result = bind_signature(decl, symtab).and_then(|returns| match decl.body.as_mut() {
        Some(body) => check_body(body, symtab, Returns::Expect(returns)),
        None => Ok(()),
    });
    symtab.pop();
    result
}

pub(crate) fn bind_signature(decl: &FunctionDecl, symtab: &mut SymbolTable) -> IdlResult<Vec<Type>> {
    for template in &decl.templates {
        let ty = resolve_type_expr(&template.ty, symtab)?.with_qualifiers(Qualifiers::CONST);
        let var = Variable::new(ty, VarOrigin::Parameter).immutable();
        symtab
            .add_var(&template.name, var)
            .map_err(|err| IdlError::symbol(err, &template.ty.span))?;
    }
    for param in &decl.params {
        let ty = resolve_type_expr(&param.ty, symtab)?;
        symtab
            .add_var(&param.name, Variable::new(ty, VarOrigin::Parameter))
            .map_err(|err| IdlError::symbol(err, &param.ty.span))?;
    }
    decl.returns
        .iter()
        .map(|ty| resolve_type_expr(ty, symtab))
        .collect()
}

/// Checks a global constant declaration and binds it in the current (global) scope.
pub fn check_global_constant(stmt: &mut Stmt, symtab: &mut SymbolTable) -> IdlResult<()> {
    let mut checker = TypeChecker::new(symtab, Returns::Forbidden);
    checker.global = true;
    checker.check_stmt(stmt)
}

/// Resolves a written type against the symbol table.
pub fn resolve_type_expr(ty: &TypeExpr, symtab: &SymbolTable) -> IdlResult<Type> {
    let resolved = match &ty.kind {
        TypeRef::Bits(width) => {
            let width = eval::const_width(width, symtab).ok_or_else(|| {
                IdlError::type_error(
                    "typeck.non-constant-width",
                    format!("width of Bits<{width}> must be a compile-time constant"),
                    &ty.span,
                )
            })?;
            if width == Width::Fixed(0) {
                return Err(IdlError::type_error("typeck.zero-width", "Bits<0> is not a type", &ty.span));
            }
            Type::bits_of(width)
        }
        TypeRef::Named(name) => symtab.lookup_type(name).cloned().ok_or_else(|| {
            IdlError::type_error("typeck.unknown-type", format!("type '{name}' is not defined"), &ty.span)
        })?,
    };
    let resolved = match (ty.signed, resolved) {
        (false, resolved) => resolved,
        (true, Type::Bits(bits)) => Type::Bits(bits).with_qualifiers(Qualifiers::SIGNED),
        (true, other) => {
            return Err(IdlError::type_error(
                "typeck.signed",
                format!("only bit vectors can be signed, found {other}"),
                &ty.span,
            ));
        }
    };
    Ok(normalize(resolved, symtab))
}

/// Pins `XLEN` in symbolic widths when the table knows the effective XLEN.
pub(crate) fn normalize(ty: Type, symtab: &SymbolTable) -> Type {
    match symtab.xlen() {
        Some(xlen) => ty.resolve_param("XLEN", xlen),
        None => ty,
    }
}

/// Replaces a template parameter by a symbolic width.
fn substitute(ty: &Type, name: &str, width: &Width) -> Type {
    match ty {
        Type::Bits(bits) => match &bits.width {
            Width::Param { name: pname, offset } if pname.as_ref() == name => {
                let mut bits = bits.clone();
                if let Some(resolved) = width.offset_by(*offset) {
                    bits.width = resolved;
                }
                Type::Bits(bits)
            }
            _ => ty.clone(),
        },
        Type::Array { element, size } => Type::Array {
            element: Box::new(substitute(element, name, width)),
            size: *size,
        },
        Type::Tuple(items) => Type::Tuple(items.iter().map(|t| substitute(t, name, width)).collect()),
        other => other.clone(),
    }
}

/// Uppercase names with an initializer declare constants.
pub(crate) fn is_constant_name(name: &str) -> bool {
    name.chars().next().is_some_and(|ch| ch.is_ascii_uppercase())
        && name
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

/// Constant value stored for a binding of the declared type.
pub(crate) fn coerce_value(value: Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Bits(bits), Type::Bits(declared)) => match declared.width.fixed() {
            Some(width) if !declared.is_unsized() => {
                let mut bits = bits.with_width(Some(width));
                bits.signed = declared.is_signed();
                Value::Bits(bits)
            }
            _ => Value::Bits(bits),
        },
        (value, _) => value,
    }
}
