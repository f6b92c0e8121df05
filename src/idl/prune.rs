//! Configuration-specialised constant folding and dead branch elimination.
//!
//! Pruning reads a typed fragment and produces a fresh tree; the input is never modified.
//! Conditions are decided outermost first, so an inner condition is only looked at when the
//! branch containing it survives. The result is type-checked again before it is handed out.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::idl::ast::{BinaryOp, Branch, Expr, ExprKind, FunctionBody, Stmt, StmtKind};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::eval;
use crate::idl::symbols::{SymbolTable, VarOrigin, Variable};
use crate::idl::typeck::{self, Returns};
use crate::idl::types::{Qualifiers, Type};

/// Prunes `body` under the configuration carried by `symtab`.
pub fn prune_body(body: &FunctionBody, symtab: &SymbolTable, returns: Returns) -> IdlResult<Arc<FunctionBody>> {
    let mut pruner = Pruner {
        symtab: symtab.deep_clone(),
        folds: 0,
    };
    pruner.symtab.push();
    let statements = pruner.block(&body.statements)?;
    let mut pruned = FunctionBody {
        statements,
        span: body.span.clone(),
    };

    let mut recheck = symtab.deep_clone();
    typeck::check_body(&mut pruned, &mut recheck, returns).map_err(|err| {
        IdlError::Internal(format!("pruned fragment at {} no longer type checks: {err}", body.span))
    })?;
    debug!(folds = pruner.folds, span = %body.span, "pruned fragment");
    Ok(Arc::new(pruned))
}

struct Pruner {
    symtab: SymbolTable,
    folds: usize,
}

impl Pruner {
    fn block(&mut self, stmts: &[Stmt]) -> IdlResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for (idx, stmt) in stmts.iter().enumerate() {
            self.stmt(stmt, &stmts[idx + 1..], &mut out)?;
        }
        Ok(out)
    }

    fn scoped_block(&mut self, stmts: &[Stmt]) -> IdlResult<Vec<Stmt>> {
        self.symtab.push();
        let result = self.block(stmts);
        self.symtab.pop();
        result
    }

    fn stmt(&mut self, stmt: &Stmt, rest: &[Stmt], out: &mut Vec<Stmt>) -> IdlResult<()> {
        let kind = match &stmt.kind {
            StmtKind::Declare { ty, vars, init } => {
                let init = init.as_ref().map(|init| self.expr(init));
                let mut vars = vars.clone();
                for var in &mut vars {
                    var.array = var.array.as_ref().map(|size| self.expr(size));
                }
                self.declare(stmt, &vars, init.as_ref())?;
                StmtKind::Declare {
                    ty: ty.clone(),
                    vars,
                    init,
                }
            }
            StmtKind::Assign { targets, value } => StmtKind::Assign {
                targets: targets.iter().map(|target| self.target(target)).collect(),
                value: self.expr(value),
            },
            StmtKind::Step { .. } => stmt.kind.clone(),
            StmtKind::Expr(expr) => StmtKind::Expr(self.expr(expr)),
            StmtKind::If {
                branches,
                otherwise,
            } => return self.if_chain(stmt, branches, otherwise.as_deref(), rest, out),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.symtab.push();
                let result = self.for_loop(init, cond, update, body);
                self.symtab.pop();
                result?
            }
            StmtKind::While { cond, body } => {
                let cond = self.expr(cond);
                if matches!(cond.kind, ExprKind::Bool(false)) {
                    trace!(span = %stmt.span, "dropped while (false)");
                    return Ok(());
                }
                StmtKind::While {
                    cond,
                    body: self.scoped_block(body)?,
                }
            }
            StmtKind::Return(values) => StmtKind::Return(values.iter().map(|value| self.expr(value)).collect()),
        };
        out.push(Stmt {
            kind,
            span: stmt.span.clone(),
            comments: stmt.comments.clone(),
            ty: None,
        });
        Ok(())
    }

    fn for_loop(&mut self, init: &Stmt, cond: &Expr, update: &Stmt, body: &[Stmt]) -> IdlResult<StmtKind> {
        let mut header = Vec::with_capacity(2);
        self.stmt(init, &[], &mut header)?;
        let cond = self.expr(cond);
        self.stmt(update, &[], &mut header)?;
        let body = self.scoped_block(body)?;
        let (Some(update), Some(init)) = (header.pop(), header.pop()) else {
            return Err(IdlError::Internal("for loop header vanished while pruning".into()));
        };
        Ok(StmtKind::For {
            init: Box::new(init),
            cond,
            update: Box::new(update),
            body,
        })
    }

    /// Binds declared names so later folds see constants and shadowing is respected.
    fn declare(&mut self, stmt: &Stmt, vars: &[crate::idl::ast::Declarator], init: Option<&Expr>) -> IdlResult<()> {
        let StmtKind::Declare { ty, .. } = &stmt.kind else {
            return Ok(());
        };
        let declared = typeck::resolve_type_expr(ty, &self.symtab)?;
        let constant = init.is_some() && vars.iter().all(|var| typeck::is_constant_name(&var.name));
        let value = if constant {
            init.and_then(|init| eval::evaluate(init, &self.symtab))
                .map(|value| typeck::coerce_value(value, &declared))
        } else {
            None
        };
        let declared = if constant {
            declared.with_qualifiers(Qualifiers::CONST)
        } else {
            declared
        };
        for var in vars {
            let ty = match var
                .array
                .as_ref()
                .and_then(|size| eval::evaluate(size, &self.symtab))
                .and_then(|size| size.as_integer())
                .and_then(|size| u32::try_from(size).ok())
            {
                Some(size) => Type::Array {
                    element: Box::new(declared.clone()),
                    size,
                },
                None => declared.clone(),
            };
            let binding = Variable {
                ty,
                value: value.clone(),
                mutable: !constant,
                origin: VarOrigin::Local,
            };
            self.symtab
                .add_var(&var.name, binding)
                .map_err(|err| IdlError::symbol(err, &var.span))?;
        }
        Ok(())
    }

    fn if_chain(
        &mut self,
        stmt: &Stmt,
        branches: &[Branch],
        otherwise: Option<&[Stmt]>,
        rest: &[Stmt],
        out: &mut Vec<Stmt>,
    ) -> IdlResult<()> {
        let mut kept = Vec::with_capacity(branches.len());
        let mut fallback = otherwise;
        for branch in branches {
            let cond = self.expr(&branch.cond);
            match cond.kind {
                ExprKind::Bool(false) => {
                    trace!(span = %branch.cond.span, "dropped branch");
                }
                ExprKind::Bool(true) if kept.is_empty() => {
                    trace!(span = %branch.cond.span, "branch always taken");
                    return self.splice(stmt, &branch.body, rest, out);
                }
                ExprKind::Bool(true) => {
                    fallback = Some(branch.body.as_slice());
                    break;
                }
                _ => kept.push(Branch {
                    cond,
                    body: self.scoped_block(&branch.body)?,
                }),
            }
        }

        if kept.is_empty() {
            return match fallback {
                Some(body) => self.splice(stmt, body, rest, out),
                None => Ok(()),
            };
        }
        let otherwise = match fallback {
            Some(body) => Some(self.scoped_block(body)?).filter(|body: &Vec<Stmt>| !body.is_empty()),
            None => None,
        };
        out.push(Stmt {
            kind: StmtKind::If {
                branches: kept,
                otherwise,
            },
            span: stmt.span.clone(),
            comments: stmt.comments.clone(),
            ty: None,
        });
        Ok(())
    }

    /// Replaces an `if` by the one body that survives it.
    ///
    /// A body declaring a name that is already bound, or that a later sibling declares, keeps
    /// its own scope.
    fn splice(&mut self, stmt: &Stmt, body: &[Stmt], rest: &[Stmt], out: &mut Vec<Stmt>) -> IdlResult<()> {
        let clash = declared_names(body)
            .any(|name| self.symtab.contains(name) || declared_names(rest).any(|later| later == name));
        if clash {
            let body = self.scoped_block(body)?;
            let span = stmt.span.clone();
            out.push(Stmt {
                kind: StmtKind::If {
                    branches: vec![Branch {
                        cond: Expr::new(ExprKind::Bool(true), span.clone()),
                        body,
                    }],
                    otherwise: None,
                },
                span,
                comments: stmt.comments.clone(),
                ty: None,
            });
            return Ok(());
        }

        let first = out.len();
        self.folds += 1;
        out.extend(self.block(body)?);
        if let Some(head) = out.get_mut(first) {
            let mut comments = stmt.comments.clone();
            comments.append(&mut head.comments);
            head.comments = comments;
        }
        Ok(())
    }

    /// Assignment targets keep their shape; only index expressions are folded.
    fn target(&mut self, target: &Expr) -> Expr {
        let kind = match &target.kind {
            ExprKind::Index { base, index } => ExprKind::Index {
                base: Box::new(self.target(base)),
                index: Box::new(self.expr(index)),
            },
            ExprKind::Slice { base, hi, lo } => ExprKind::Slice {
                base: Box::new(self.target(base)),
                hi: Box::new(self.expr(hi)),
                lo: Box::new(self.expr(lo)),
            },
            ExprKind::Member { base, field } => ExprKind::Member {
                base: Box::new(self.target(base)),
                field: field.clone(),
            },
            other => other.clone(),
        };
        Expr::new(kind, target.span.clone())
    }

    fn expr(&mut self, expr: &Expr) -> Expr {
        let leaf = matches!(
            expr.kind,
            ExprKind::Literal(_) | ExprKind::Bool(_) | ExprKind::String(_) | ExprKind::EnumMember { .. }
        );
        if leaf {
            return Expr::new(expr.kind.clone(), expr.span.clone());
        }
        if let Some(value) = eval::evaluate(expr, &self.symtab) {
            self.folds += 1;
            trace!(expr = %expr, value = %value, "folded");
            return Expr::from_value(&value, expr.span.clone());
        }

        let span = expr.span.clone();
        let boxed = |pruner: &mut Self, expr: &Expr| Box::new(pruner.expr(expr));
        let kind = match &expr.kind {
            ExprKind::Unary { op, expr: operand } => ExprKind::Unary {
                op: *op,
                expr: boxed(self, operand),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                match (op, &lhs.kind, &rhs.kind) {
                    (BinaryOp::LogicalAnd, ExprKind::Bool(true), _) | (BinaryOp::LogicalOr, ExprKind::Bool(false), _) => {
                        return rhs;
                    }
                    (BinaryOp::LogicalAnd, _, ExprKind::Bool(true)) | (BinaryOp::LogicalOr, _, ExprKind::Bool(false)) => {
                        return lhs;
                    }
                    _ => ExprKind::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                }
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond);
                match cond.kind {
                    ExprKind::Bool(true) => return self.expr(then),
                    ExprKind::Bool(false) => return self.expr(otherwise),
                    _ => ExprKind::Ternary {
                        cond: Box::new(cond),
                        then: boxed(self, then),
                        otherwise: boxed(self, otherwise),
                    },
                }
            }
            ExprKind::Index { base, index } => ExprKind::Index {
                base: boxed(self, base),
                index: boxed(self, index),
            },
            ExprKind::Slice { base, hi, lo } => ExprKind::Slice {
                base: boxed(self, base),
                hi: boxed(self, hi),
                lo: boxed(self, lo),
            },
            ExprKind::Concat(items) => ExprKind::Concat(items.iter().map(|item| self.expr(item)).collect()),
            ExprKind::Replicate { count, expr: operand } => ExprKind::Replicate {
                count: boxed(self, count),
                expr: boxed(self, operand),
            },
            ExprKind::Member { base, field } => ExprKind::Member {
                base: boxed(self, base),
                field: field.clone(),
            },
            ExprKind::Call {
                function,
                templates,
                args,
            } => ExprKind::Call {
                function: function.clone(),
                templates: templates.iter().map(|item| self.expr(item)).collect(),
                args: args.iter().map(|item| self.expr(item)).collect(),
            },
            ExprKind::Builtin { name, args } => ExprKind::Builtin {
                name: name.clone(),
                args: args.iter().map(|item| self.expr(item)).collect(),
            },
            ExprKind::Csr { csr, access } => {
                let access = match access {
                    crate::idl::ast::CsrAccess::Method { name, args } => crate::idl::ast::CsrAccess::Method {
                        name: name.clone(),
                        args: args.iter().map(|item| self.expr(item)).collect(),
                    },
                    other => other.clone(),
                };
                ExprKind::Csr {
                    csr: csr.clone(),
                    access,
                }
            }
            ExprKind::Var(_)
            | ExprKind::Literal(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::EnumMember { .. } => expr.kind.clone(),
        };
        Expr::new(kind, span)
    }
}

fn declared_names(stmts: &[Stmt]) -> impl Iterator<Item = &str> {
    stmts.iter().flat_map(|stmt| match &stmt.kind {
        StmtKind::Declare { vars, .. } => vars.iter().map(|var| var.name.as_str()).collect::<Vec<_>>(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::ast::render_body;
    use crate::idl::test_support::{assert_fully_typed, body, symtab_full, symtab_generic, symtab_partial};

    fn typed(text: &str, symtab: &SymbolTable) -> FunctionBody {
        let mut parsed = body(text);
        typeck::check_body(&mut parsed, &mut symtab.deep_clone(), Returns::Forbidden).expect("input type checks");
        parsed
    }

    fn prune_with(text: &str, symtab: &SymbolTable) -> Arc<FunctionBody> {
        prune_body(&typed(text, symtab), symtab, Returns::Forbidden).expect("prunes")
    }

    fn with_local_a(mut symtab: SymbolTable) -> SymbolTable {
        symtab.push();
        symtab
            .add_var("a", Variable::local(Type::bits(8)))
            .expect("a");
        symtab
    }

    const Q_BRANCH: &str = "if (implemented?(Extension::Q)) { a = 1; } else { a = 2; }";

    #[test]
    fn decided_extension_checks_collapse_to_one_branch() {
        let symtab = with_local_a(symtab_full(&["I"], 64));
        let pruned = prune_with(Q_BRANCH, &symtab);
        assert_eq!(render_body(&pruned).trim(), "a = 2;");
        assert_fully_typed(&pruned);
    }

    #[test]
    fn undecided_extension_checks_keep_both_branches() {
        let symtab = with_local_a(symtab_partial(&["I"], &[], 64));
        let pruned = prune_with(Q_BRANCH, &symtab);
        let StmtKind::If { branches, otherwise } = &pruned.statements[0].kind else {
            panic!("if statement should survive: {}", render_body(&pruned));
        };
        assert_eq!(branches.len(), 1);
        assert!(otherwise.is_some());
    }

    #[test]
    fn unconfigured_designs_never_fold_presence() {
        let symtab = with_local_a(symtab_generic());
        let pruned = prune_with(Q_BRANCH, &symtab);
        assert!(matches!(pruned.statements[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn outer_conditions_are_decided_first() {
        let symtab = with_local_a(symtab_partial(&["I"], &["Q"], 64));
        let text = "if (implemented?(Extension::Q)) { if (implemented?(Extension::M)) { a = 1; } } else { if (implemented?(Extension::M)) { a = 3; } else { a = 4; } }";
        let pruned = prune_with(text, &symtab);
        let rendered = render_body(&pruned);
        assert!(!rendered.contains("a = 1;"), "{rendered}");
        assert!(rendered.contains("implemented?(Extension::M)"), "{rendered}");
        assert!(rendered.contains("a = 3;") && rendered.contains("a = 4;"), "{rendered}");
    }

    #[test]
    fn parameters_and_constants_fold() {
        let symtab = symtab_full(&["I"], 64);
        let pruned = prune_with("Bits<8> WIDTH = XLEN - 56; Bits<8> b = WIDTH + 1;", &symtab);
        let rendered = render_body(&pruned);
        assert!(rendered.contains("Bits<8> b = 8'd9;"), "{rendered}");
    }

    #[test]
    fn logical_identities_and_ternaries_fold() {
        let symtab = with_local_a(symtab_full(&["I", "M"], 64));
        let pruned = prune_with(
            "Boolean flag = a == 3; if (implemented?(Extension::M) && flag) { a = implemented?(Extension::Q) ? 1 : 2; }",
            &symtab,
        );
        let rendered = render_body(&pruned);
        assert!(rendered.contains("if (flag)"), "{rendered}");
        assert!(rendered.contains("a = 2;"), "{rendered}");
    }

    #[test]
    fn while_false_is_dropped() {
        let symtab = with_local_a(symtab_full(&["I"], 64));
        let pruned = prune_with("while (implemented?(Extension::Q)) { a = a + 1; } a = 0;", &symtab);
        assert_eq!(render_body(&pruned).trim(), "a = 0;");
    }

    #[test]
    fn inlining_stops_at_name_clashes() {
        let symtab = with_local_a(symtab_full(&["I"], 64));
        let pruned = prune_with(
            "if (implemented?(Extension::I)) { Bits<8> t = 1; a = t; } Bits<8> t = 2; a = t;",
            &symtab,
        );
        assert!(matches!(pruned.statements[0].kind, StmtKind::If { .. }));
        assert_eq!(pruned.statements.len(), 3);
    }

    #[test]
    fn inlining_never_shadows_an_outer_binding() {
        let symtab = with_local_a(symtab_full(&["I"], 64));
        let pruned = prune_with(
            "Boolean c = a == 0; if (c) { if (implemented?(Extension::I)) { Bits<8> a = 5; } a = 7; }",
            &symtab,
        );
        let StmtKind::If { branches, .. } = &pruned.statements[1].kind else {
            panic!("outer if should survive: {}", render_body(&pruned));
        };
        let body = &branches[0].body;
        assert_eq!(body.len(), 2, "{}", render_body(&pruned));
        assert!(matches!(body[0].kind, StmtKind::If { .. }), "{}", render_body(&pruned));
        assert!(matches!(body[1].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn pruning_is_idempotent() {
        let symtab = with_local_a(symtab_full(&["I", "M"], 64));
        let text = "# keep me\nif (implemented?(Extension::M)) { a = XLEN'b0[7:0]; } else { a = 1; }\nif (a == 0) { a = 1; }";
        let once = prune_with(text, &symtab);
        let twice = prune_body(&once, &symtab, Returns::Forbidden).expect("second prune");
        assert_eq!(*once, *twice);
        assert!(once.statements[0].comments.iter().any(|c| c.contains("keep me")));
    }

    #[test]
    fn input_tree_is_untouched() {
        let symtab = with_local_a(symtab_full(&["I"], 64));
        let input = typed(Q_BRANCH, &symtab);
        let before = input.clone();
        prune_body(&input, &symtab, Returns::Forbidden).expect("prunes");
        assert_eq!(input, before);
    }
}
