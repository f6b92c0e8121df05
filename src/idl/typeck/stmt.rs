use crate::idl::SourceSpan;
use crate::idl::ast::{Expr, ExprKind, Stmt, StmtKind, TypeRef};
use crate::idl::error::{IdlError, IdlResult, SymbolError};
use crate::idl::eval;
use crate::idl::symbols::{Symbol, VarOrigin, Variable};
use crate::idl::types::{Qualifiers, Type};

use super::{Returns, TypeChecker, assignable, coerce_value, is_constant_name, resolve_type_expr};

impl TypeChecker<'_> {
    pub(super) fn check_block(&mut self, stmts: &mut [Stmt]) -> IdlResult<()> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_scoped_block(&mut self, stmts: &mut [Stmt]) -> IdlResult<()> {
        self.scoped(|checker| checker.check_block(stmts))
    }

    pub(super) fn check_stmt(&mut self, stmt: &mut Stmt) -> IdlResult<()> {
        let span = stmt.span.clone();
        let ty = match &mut stmt.kind {
            StmtKind::Declare { ty, vars, init } => {
                let mut declared = resolve_type_expr(ty, self.symtab)?;
                if let TypeRef::Bits(width) = &mut ty.kind {
                    self.check_expr(width)?;
                }
                let constant =
                    self.global || (init.is_some() && vars.iter().all(|var| is_constant_name(&var.name)));
                let mut value = None;
                if let Some(init) = init {
                    let it = self.check_expr(init)?;
                    self.check_assignable(init, &it, &declared, "initialize", &span)?;
                    if constant {
                        value = eval::evaluate(init, self.symtab).map(|v| coerce_value(v, &declared));
                        if self.global && value.is_none() {
                            return Err(IdlError::type_error(
                                "typeck.non-constant",
                                format!(
                                    "global '{}' must be initialized with a compile-time constant",
                                    vars.first().map(|v| v.name.as_str()).unwrap_or_default()
                                ),
                                &init.span,
                            ));
                        }
                    }
                }
                if constant {
                    declared = declared.with_qualifiers(Qualifiers::CONST);
                }
                let origin = if self.global { VarOrigin::Global } else { VarOrigin::Local };
                for var in vars.iter_mut() {
                    let var_ty = match &mut var.array {
                        Some(size) => {
                            self.check_expr(size)?;
                            let size = eval::evaluate(size, self.symtab)
                                .and_then(|v| v.as_integer())
                                .and_then(|n| u32::try_from(n).ok())
                                .ok_or_else(|| {
                                    IdlError::type_error(
                                        "typeck.array-size",
                                        "array size must be a compile-time constant",
                                        &size.span,
                                    )
                                })?;
                            Type::Array {
                                element: Box::new(declared.clone()),
                                size,
                            }
                        }
                        None => declared.clone(),
                    };
                    let binding = Variable {
                        ty: var_ty,
                        value: value.clone(),
                        mutable: !constant,
                        origin,
                    };
                    self.symtab
                        .add_var(&var.name, binding)
                        .map_err(|err| IdlError::symbol(err, &var.span))?;
                }
                declared
            }
            StmtKind::Assign { targets, value } => {
                let vt = self.check_expr(value)?;
                if let [target] = targets.as_mut_slice() {
                    let tt = self.check_target(target)?;
                    self.check_assignable(value, &vt, &tt, "assign", &span)?;
                } else {
                    let Type::Tuple(items) = &vt else {
                        return Err(IdlError::type_error(
                            "typeck.multi-assign",
                            format!("expected {} values, found {vt}", targets.len()),
                            &value.span,
                        ));
                    };
                    if items.len() != targets.len() {
                        return Err(IdlError::type_error(
                            "typeck.multi-assign",
                            format!("expected {} values, found {vt}", targets.len()),
                            &value.span,
                        ));
                    }
                    for (target, item) in targets.iter_mut().zip(items) {
                        let tt = self.check_target(target)?;
                        if !assignable(item, &tt, self.symtab) {
                            return Err(IdlError::type_error(
                                "typeck.assign",
                                format!("cannot assign {item} to {tt}"),
                                &target.span,
                            ));
                        }
                    }
                }
                Type::Void
            }
            StmtKind::Step { target, .. } => {
                let tt = self.check_target(target)?;
                if !matches!(&tt, Type::Bits(bits) if !bits.is_unsized()) {
                    return Err(IdlError::type_error(
                        "typeck.step",
                        format!("cannot increment or decrement {tt}"),
                        &span,
                    ));
                }
                Type::Void
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr)?;
                Type::Void
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches.iter_mut() {
                    self.check_condition(&mut branch.cond)?;
                    self.check_scoped_block(&mut branch.body)?;
                }
                if let Some(body) = otherwise {
                    self.check_scoped_block(body)?;
                }
                Type::Void
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.scoped(|checker| {
                    checker.check_stmt(init)?;
                    checker.check_condition(cond)?;
                    checker.check_stmt(update)?;
                    checker.check_scoped_block(body)
                })?;
                Type::Void
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond)?;
                self.check_scoped_block(body)?;
                Type::Void
            }
            StmtKind::Return(values) => {
                let Returns::Expect(expected) = self.returns.clone() else {
                    return Err(IdlError::type_error(
                        "typeck.unexpected-return",
                        "return is not allowed here",
                        &span,
                    ));
                };
                if values.len() != expected.len() {
                    return Err(IdlError::type_error(
                        "typeck.return-arity",
                        format!("expected {} return values, found {}", expected.len(), values.len()),
                        &span,
                    ));
                }
                for (value, expected) in values.iter_mut().zip(&expected) {
                    let vt = self.check_expr(value)?;
                    self.check_assignable(value, &vt, expected, "return", &span)?;
                }
                Type::Void
            }
        };
        stmt.ty = Some(ty);
        Ok(())
    }

    fn check_condition(&mut self, cond: &mut Expr) -> IdlResult<()> {
        let ty = self.check_expr(cond)?;
        if ty != Type::Boolean {
            return Err(IdlError::type_error(
                "typeck.condition",
                format!("condition must be Boolean, found {ty}"),
                &cond.span,
            ));
        }
        Ok(())
    }

    fn check_assignable(
        &self,
        value: &Expr,
        from: &Type,
        to: &Type,
        verb: &str,
        span: &SourceSpan,
    ) -> IdlResult<()> {
        if !assignable(from, to, self.symtab) {
            return Err(IdlError::type_error(
                "typeck.assign",
                format!("cannot {verb} {to} with {from}"),
                span,
            ));
        }
        if let (true, Some(target)) = (from.is_unsized(), to.as_bits()) {
            self.check_fits(value, target)?;
        }
        Ok(())
    }

    /// Types an assignment target after checking that its root binding is writable.
    fn check_target(&mut self, target: &mut Expr) -> IdlResult<Type> {
        self.writable_root(target)?;
        self.check_expr(target)
    }

    fn writable_root(&self, target: &Expr) -> IdlResult<()> {
        match &target.kind {
            ExprKind::Var(name) => match self.symtab.get(name) {
                Ok(Symbol::Variable(var)) if var.mutable => Ok(()),
                Ok(Symbol::Variable(_)) => Err(IdlError::symbol(
                    SymbolError::ConstAssignment(name.clone()),
                    &target.span,
                )),
                Ok(other) => Err(IdlError::type_error(
                    "typeck.invalid-target",
                    format!("cannot assign to {} '{name}'", other.kind_name()),
                    &target.span,
                )),
                Err(err) => Err(IdlError::symbol(err, &target.span)),
            },
            ExprKind::Index { base, .. } | ExprKind::Slice { base, .. } | ExprKind::Member { base, .. } => {
                self.writable_root(base)
            }
            ExprKind::Csr { .. } => Ok(()),
            _ => Err(IdlError::type_error(
                "typeck.invalid-target",
                format!("cannot assign to `{target}`"),
                &target.span,
            )),
        }
    }
}
