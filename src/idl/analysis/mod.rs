//! Whole-program passes over typed (usually pruned) fragments.
//!
//! The passes never modify the trees they read. Callee bodies come in through [`CalleeBodies`],
//! so the same walk can follow raw global functions or the pruned copies cached by a
//! compilation context.

pub mod calls;
pub mod exceptions;
pub mod registers;

use std::sync::Arc;

use crate::idl::ast::{CsrAccess, Expr, ExprKind, FunctionBody, FunctionDecl, Stmt, StmtKind};
use crate::idl::error::IdlResult;
use crate::idl::eval;
use crate::idl::symbols::{SymbolTable, VarOrigin, Variable};
use crate::idl::typeck;
use crate::idl::types::Type;
use crate::idl::value::Value;
use crate::loader::idl::parse_function_body;

pub use calls::{reachable_functions, reachable_functions_unevaluated};
pub use exceptions::reachable_exceptions;
pub use registers::{RegDetermination, RegisterRef, find_dst_registers, find_src_registers};

/// Source of callee bodies for the reachability walks.
pub trait CalleeBodies {
    /// Body of the global function `name`; `None` for builtins.
    fn function_body(&self, name: &str) -> IdlResult<Option<Arc<FunctionBody>>>;

    /// Body of `CSR[csr].sw_read()`, if the register has one.
    fn csr_sw_read_body(&self, csr: &str) -> IdlResult<Option<Arc<FunctionBody>>>;
}

/// Unpruned bodies straight from the symbol table and the architecture records.
pub struct RawBodies<'a> {
    symtab: &'a SymbolTable,
}

impl<'a> RawBodies<'a> {
    pub fn new(symtab: &'a SymbolTable) -> Self {
        Self { symtab }
    }
}

impl CalleeBodies for RawBodies<'_> {
    fn function_body(&self, name: &str) -> IdlResult<Option<Arc<FunctionBody>>> {
        Ok(self
            .symtab
            .lookup_function(name)
            .and_then(|decl| decl.body.clone())
            .map(Arc::new))
    }

    fn csr_sw_read_body(&self, csr: &str) -> IdlResult<Option<Arc<FunctionBody>>> {
        let Some(source) = self.symtab.csr(csr).and_then(|csr| csr.sw_read.as_ref()) else {
            return Ok(None);
        };
        parse_function_body(&source.text, &source.origin()).map(|body| Some(Arc::new(body)))
    }
}

/// Callbacks for the interesting leaves of a [`Flow`] walk.
pub(crate) trait FlowVisitor {
    fn call(&mut self, flow: &Flow, decl: &Arc<FunctionDecl>, templates: &[Expr], args: &[Expr]) -> IdlResult<()>;

    fn csr_read(&mut self, _flow: &Flow, _csr: &str) -> IdlResult<()> {
        Ok(())
    }
}

/// Control-flow aware walk that tracks local constants.
///
/// With `evaluate` set, branches whose condition folds to `false` are skipped and a chain stops
/// at the first branch that folds to `true`. Without it every syntactic path is visited.
pub(crate) struct Flow {
    symtab: SymbolTable,
    evaluate: bool,
}

impl Flow {
    pub(crate) fn new(symtab: &SymbolTable, evaluate: bool) -> Self {
        let mut symtab = symtab.deep_clone();
        symtab.push();
        Self { symtab, evaluate }
    }

    /// Walk for a callee body, with template and argument values bound by name.
    pub(crate) fn for_callee(
        caller: &SymbolTable,
        decl: &FunctionDecl,
        templates: &[Option<Value>],
        args: &[Option<Value>],
        evaluate: bool,
    ) -> Self {
        let mut flow = Self::new(&caller.global_clone(), evaluate);
        let bindings = decl
            .templates
            .iter()
            .zip(templates.iter().chain(std::iter::repeat(&None)))
            .chain(decl.params.iter().zip(args.iter().chain(std::iter::repeat(&None))));
        for (param, value) in bindings {
            // Only the value matters to the walks; unresolved widths fall back to Void.
            let ty = typeck::resolve_type_expr(&param.ty, &flow.symtab).unwrap_or(Type::Void);
            let var = Variable::new(ty, VarOrigin::Parameter)
                .immutable()
                .with_value(value.clone());
            // Duplicate parameter names were rejected when the function was checked.
            let _ = flow.symtab.add_var(&param.name, var);
        }
        flow
    }

    pub(crate) fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    pub(crate) fn evaluates(&self) -> bool {
        self.evaluate
    }

    pub(crate) fn value_of(&self, expr: &Expr) -> Option<Value> {
        if self.evaluate {
            eval::evaluate(expr, &self.symtab)
        } else {
            None
        }
    }

    pub(crate) fn body(&mut self, body: &FunctionBody, visitor: &mut impl FlowVisitor) -> IdlResult<()> {
        self.block(&body.statements, visitor)
    }

    fn block(&mut self, stmts: &[Stmt], visitor: &mut impl FlowVisitor) -> IdlResult<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt, visitor))
    }

    fn scoped(&mut self, stmts: &[Stmt], visitor: &mut impl FlowVisitor) -> IdlResult<()> {
        self.symtab.push();
        let result = self.block(stmts, visitor);
        self.symtab.pop();
        result
    }

    fn stmt(&mut self, stmt: &Stmt, visitor: &mut impl FlowVisitor) -> IdlResult<()> {
        match &stmt.kind {
            StmtKind::Declare { vars, init, .. } => {
                if let Some(init) = init {
                    self.expr(init, visitor)?;
                }
                let constant = init.is_some() && vars.iter().all(|var| typeck::is_constant_name(&var.name));
                let value = init.as_ref().filter(|_| constant).and_then(|init| self.value_of(init));
                let ty = stmt.ty.clone().unwrap_or(Type::Void);
                for var in vars {
                    let binding = Variable::local(ty.clone()).with_value(value.clone());
                    let binding = if constant { binding.immutable() } else { binding };
                    // Shadowing mistakes were reported by the type checker.
                    let _ = self.symtab.add_var(&var.name, binding);
                }
                Ok(())
            }
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.expr(target, visitor)?;
                }
                self.expr(value, visitor)
            }
            StmtKind::Step { target, .. } => self.expr(target, visitor),
            StmtKind::Expr(expr) => self.expr(expr, visitor),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    self.expr(&branch.cond, visitor)?;
                    match self.value_of(&branch.cond).and_then(|value| value.as_bool()) {
                        Some(false) => continue,
                        Some(true) => return self.scoped(&branch.body, visitor),
                        None => self.scoped(&branch.body, visitor)?,
                    }
                }
                match otherwise {
                    Some(body) => self.scoped(body, visitor),
                    None => Ok(()),
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.symtab.push();
                let result = self
                    .stmt(init, visitor)
                    .and_then(|()| self.expr(cond, visitor))
                    .and_then(|()| self.stmt(update, visitor))
                    .and_then(|()| self.scoped(body, visitor));
                self.symtab.pop();
                result
            }
            StmtKind::While { cond, body } => {
                self.expr(cond, visitor)?;
                if self.value_of(cond).and_then(|value| value.as_bool()) == Some(false) {
                    return Ok(());
                }
                self.scoped(body, visitor)
            }
            StmtKind::Return(values) => values.iter().try_for_each(|value| self.expr(value, visitor)),
        }
    }

    fn expr(&mut self, expr: &Expr, visitor: &mut impl FlowVisitor) -> IdlResult<()> {
        match &expr.kind {
            ExprKind::Literal(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Var(_)
            | ExprKind::EnumMember { .. } => Ok(()),
            ExprKind::Unary { expr, .. } => self.expr(expr, visitor),
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs, visitor)?;
                let short = match op {
                    crate::idl::ast::BinaryOp::LogicalAnd => Some(false),
                    crate::idl::ast::BinaryOp::LogicalOr => Some(true),
                    _ => None,
                };
                if short.is_some() && self.value_of(lhs).and_then(|value| value.as_bool()) == short {
                    return Ok(());
                }
                self.expr(rhs, visitor)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, visitor)?;
                match self.value_of(cond).and_then(|value| value.as_bool()) {
                    Some(true) => self.expr(then, visitor),
                    Some(false) => self.expr(otherwise, visitor),
                    None => {
                        self.expr(then, visitor)?;
                        self.expr(otherwise, visitor)
                    }
                }
            }
            ExprKind::Index { base, index } => {
                self.expr(base, visitor)?;
                self.expr(index, visitor)
            }
            ExprKind::Slice { base, hi, lo } => {
                self.expr(base, visitor)?;
                self.expr(hi, visitor)?;
                self.expr(lo, visitor)
            }
            ExprKind::Concat(items) => items.iter().try_for_each(|item| self.expr(item, visitor)),
            ExprKind::Replicate { count, expr } => {
                self.expr(count, visitor)?;
                self.expr(expr, visitor)
            }
            ExprKind::Member { base, .. } => self.expr(base, visitor),
            ExprKind::Call {
                function,
                templates,
                args,
            } => {
                if let Some(decl) = self.symtab.lookup_function(function).cloned() {
                    visitor.call(self, &decl, templates, args)?;
                }
                templates
                    .iter()
                    .chain(args)
                    .try_for_each(|item| self.expr(item, visitor))
            }
            ExprKind::Builtin { args, .. } => args.iter().try_for_each(|item| self.expr(item, visitor)),
            ExprKind::Csr { csr, access } => match access {
                CsrAccess::Method { name, args } => {
                    args.iter().try_for_each(|item| self.expr(item, visitor))?;
                    if name == "sw_read" {
                        visitor.csr_read(self, csr)?;
                    }
                    Ok(())
                }
                CsrAccess::Value | CsrAccess::Field(_) => Ok(()),
            },
        }
    }
}
