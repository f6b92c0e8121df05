//! General purpose registers an operation reads and writes.

use std::fmt;

use crate::idl::ast::{Expr, ExprKind, FunctionBody, Stmt, StmtKind};
use crate::idl::eval;
use crate::idl::symbols::{SymbolTable, VarOrigin};

/// One `X[...]` index that could be resolved statically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegisterRef {
    /// Indexed by an encoding field such as `rs1`.
    Decode(String),
    /// Indexed by a constant.
    Index(u32),
}

impl fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterRef::Decode(field) => write!(f, "X[{field}]"),
            RegisterRef::Index(idx) => write!(f, "x{idx}"),
        }
    }
}

/// Outcome of a register analysis.
///
/// `Complex` is an expected answer, not a failure: the operation computes a register index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegDetermination {
    /// Deduplicated, in order of first appearance.
    Registers(Vec<RegisterRef>),
    Complex,
}

/// Registers read by `body`.
pub fn find_src_registers(body: &FunctionBody, symtab: &SymbolTable) -> RegDetermination {
    find(body, symtab, Role::Source)
}

/// Registers written by `body`.
pub fn find_dst_registers(body: &FunctionBody, symtab: &SymbolTable) -> RegDetermination {
    find(body, symtab, Role::Destination)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Source,
    Destination,
}

struct Finder<'a> {
    symtab: &'a SymbolTable,
    role: Role,
    found: Vec<RegisterRef>,
    complex: bool,
}

fn find(body: &FunctionBody, symtab: &SymbolTable, role: Role) -> RegDetermination {
    let mut finder = Finder {
        symtab,
        role,
        found: Vec::new(),
        complex: false,
    };
    finder.block(&body.statements);
    if finder.complex {
        RegDetermination::Complex
    } else {
        RegDetermination::Registers(finder.found)
    }
}

impl Finder<'_> {
    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.target(target);
                }
                self.reads(value);
            }
            StmtKind::Step { target, .. } => {
                self.target(target);
                if let Some(index) = register_index(target) {
                    self.note(Role::Source, index);
                }
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    self.reads(&branch.cond);
                    self.block(&branch.body);
                }
                if let Some(body) = otherwise {
                    self.block(body);
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.stmt(init);
                self.reads(cond);
                self.stmt(update);
                self.block(body);
            }
            StmtKind::While { cond, body } => {
                self.reads(cond);
                self.block(body);
            }
            StmtKind::Declare { .. } | StmtKind::Expr(_) | StmtKind::Return(_) => {
                stmt.walk_exprs(&mut |expr| self.read(expr));
            }
        }
    }

    /// A write target; index subexpressions are still reads.
    fn target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Index { base, index } if is_register_file(base) => {
                self.note(Role::Destination, index);
                self.reads(index);
            }
            ExprKind::Index { base, index } => {
                self.target(base);
                self.reads(index);
            }
            ExprKind::Slice { base, hi, lo } => {
                self.target(base);
                self.reads(hi);
                self.reads(lo);
            }
            ExprKind::Member { base, .. } => self.target(base),
            _ => {}
        }
    }

    fn reads(&mut self, expr: &Expr) {
        expr.walk(&mut |node| self.read(node));
    }

    fn read(&mut self, expr: &Expr) {
        if let Some(index) = register_index(expr) {
            self.note(Role::Source, index);
        }
    }

    fn note(&mut self, role: Role, index: &Expr) {
        if role != self.role {
            return;
        }
        let reg = match &index.kind {
            ExprKind::Var(name)
                if self
                    .symtab
                    .lookup_var(name)
                    .is_some_and(|var| var.origin == VarOrigin::DecodeField) =>
            {
                Some(RegisterRef::Decode(name.clone()))
            }
            _ => eval::evaluate(index, self.symtab)
                .and_then(|value| value.as_integer())
                .and_then(|idx| u32::try_from(idx).ok())
                .map(RegisterRef::Index),
        };
        match reg {
            Some(reg) if !self.found.contains(&reg) => self.found.push(reg),
            Some(_) => {}
            None => self.complex = true,
        }
    }
}

fn is_register_file(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Var(name) if name == "X")
}

fn register_index(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::Index { base, index } if is_register_file(base) => Some(index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::symbols::Variable;
    use crate::idl::test_support::{body, symtab_full};
    use crate::idl::types::Type;

    fn with_decode_fields() -> SymbolTable {
        let mut symtab = symtab_full(&["I"], 64);
        symtab.push();
        for field in ["rs1", "rs2", "rd"] {
            symtab
                .add_var(field, Variable::new(Type::bits(5), VarOrigin::DecodeField).immutable())
                .expect("decode field");
        }
        symtab
    }

    fn decode(names: &[&str]) -> RegDetermination {
        RegDetermination::Registers(names.iter().map(|name| RegisterRef::Decode((*name).into())).collect())
    }

    #[test]
    fn decode_indexed_registers_are_resolved() {
        let symtab = with_decode_fields();
        let op = body("X[rd] = X[rs1] + X[rs2];");
        assert_eq!(find_src_registers(&op, &symtab), decode(&["rs1", "rs2"]));
        assert_eq!(find_dst_registers(&op, &symtab), decode(&["rd"]));
    }

    #[test]
    fn constant_indices_and_repeats() {
        let symtab = with_decode_fields();
        let op = body("X[1] = X[rs1]; if (X[rs1] == 0) { X[rd] = X[rs1]; }");
        assert_eq!(
            find_dst_registers(&op, &symtab),
            RegDetermination::Registers(vec![RegisterRef::Index(1), RegisterRef::Decode("rd".into())])
        );
        assert_eq!(find_src_registers(&op, &symtab), decode(&["rs1"]));
    }

    #[test]
    fn computed_indices_are_complex() {
        let symtab = with_decode_fields();
        let op = body("Bits<5> r = rs1 + 1; X[rd] = X[r];");
        assert_eq!(find_src_registers(&op, &symtab), RegDetermination::Complex);
        assert_eq!(find_dst_registers(&op, &symtab), decode(&["rd"]));
    }

    #[test]
    fn no_register_access_is_an_empty_set() {
        let symtab = with_decode_fields();
        let op = body("raise(ExceptionCode::Breakpoint, mode(), 0);");
        assert_eq!(find_src_registers(&op, &symtab), RegDetermination::Registers(Vec::new()));
    }
}
