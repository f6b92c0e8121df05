//! Source printer for the AST; output re-parses to an equivalent tree.

use std::fmt;

use super::{CsrAccess, Expr, ExprKind, FunctionBody, Stmt, StmtKind, TypeExpr, TypeRef};

/// Hooks for printers that decorate names, such as cross-referencing documentation output.
pub trait NameStyle {
    fn function(&self, name: &str) -> String {
        name.to_string()
    }

    fn csr(&self, csr: &str) -> String {
        csr.to_string()
    }

    fn csr_field(&self, _csr: &str, field: &str) -> String {
        field.to_string()
    }
}

struct Plain;

impl NameStyle for Plain {}

/// An expression printed through a [`NameStyle`].
pub struct Styled<'a> {
    expr: &'a Expr,
    style: &'a dyn NameStyle,
}

impl<'a> Styled<'a> {
    pub fn new(expr: &'a Expr, style: &'a dyn NameStyle) -> Self {
        Self { expr, style }
    }
}

const TERNARY_PRECEDENCE: u8 = 0;
const UNARY_PRECEDENCE: u8 = 11;
const POSTFIX_PRECEDENCE: u8 = 12;

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Ternary { .. } => TERNARY_PRECEDENCE,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } => UNARY_PRECEDENCE,
        _ => POSTFIX_PRECEDENCE,
    }
}

impl Styled<'_> {
    fn child<'b>(&'b self, expr: &'b Expr) -> Styled<'b> {
        Styled {
            expr,
            style: self.style,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
        if precedence(expr) < min {
            write!(f, "({})", self.child(expr))
        } else {
            write!(f, "{}", self.child(expr))
        }
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.child(item))?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Styled::new(self, &Plain).fmt(f)
    }
}

impl fmt::Display for Styled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr.kind {
            ExprKind::Literal(literal) => f.write_str(&literal.text),
            ExprKind::Bool(flag) => write!(f, "{flag}"),
            ExprKind::String(text) => write!(f, "\"{}\"", text.escape_default()),
            ExprKind::Var(name) => f.write_str(name),
            ExprKind::EnumMember { ty, member } => write!(f, "{ty}::{member}"),
            ExprKind::Unary { op, expr } => {
                f.write_str(op.symbol())?;
                self.write_operand(f, expr, UNARY_PRECEDENCE)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.write_operand(f, lhs, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                self.write_operand(f, rhs, op.precedence() + 1)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.write_operand(f, cond, TERNARY_PRECEDENCE + 1)?;
                f.write_str(" ? ")?;
                self.write_operand(f, then, TERNARY_PRECEDENCE + 1)?;
                f.write_str(" : ")?;
                self.write_operand(f, otherwise, TERNARY_PRECEDENCE)
            }
            ExprKind::Index { base, index } => {
                self.write_operand(f, base, POSTFIX_PRECEDENCE)?;
                write!(f, "[{}]", self.child(index))
            }
            ExprKind::Slice { base, hi, lo } => {
                self.write_operand(f, base, POSTFIX_PRECEDENCE)?;
                write!(f, "[{}:{}]", self.child(hi), self.child(lo))
            }
            ExprKind::Concat(items) => {
                f.write_str("{")?;
                self.write_list(f, items)?;
                f.write_str("}")
            }
            ExprKind::Replicate { count, expr } => {
                write!(f, "{{{}{{{}}}}}", self.child(count), self.child(expr))
            }
            ExprKind::Member { base, field } => {
                self.write_operand(f, base, POSTFIX_PRECEDENCE)?;
                write!(f, ".{field}")
            }
            ExprKind::Call {
                function,
                templates,
                args,
            } => {
                f.write_str(&self.style.function(function))?;
                if !templates.is_empty() {
                    f.write_str("<")?;
                    self.write_list(f, templates)?;
                    f.write_str(">")?;
                }
                f.write_str("(")?;
                self.write_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::Builtin { name, args } => {
                write!(f, "${name}(")?;
                self.write_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::Csr { csr, access } => {
                write!(f, "CSR[{}]", self.style.csr(csr))?;
                match access {
                    CsrAccess::Value => Ok(()),
                    CsrAccess::Field(field) => write!(f, ".{}", self.style.csr_field(csr, field)),
                    CsrAccess::Method { name, args } => {
                        write!(f, ".{name}(")?;
                        self.write_list(f, args)?;
                        f.write_str(")")
                    }
                }
            }
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            f.write_str("signed ")?;
        }
        match &self.kind {
            TypeRef::Bits(width) => write!(f, "Bits<{width}>"),
            TypeRef::Named(name) => f.write_str(name),
        }
    }
}

/// Statement text without the trailing `;`, as used in `for` headers.
fn render_simple(stmt: &Stmt, style: &dyn NameStyle) -> String {
    let show = |expr: &Expr| Styled::new(expr, style).to_string();
    let list = |exprs: &[Expr]| exprs.iter().map(show).collect::<Vec<_>>().join(", ");
    match &stmt.kind {
        StmtKind::Declare { ty, vars, init } => {
            let names = vars
                .iter()
                .map(|var| match &var.array {
                    Some(size) => format!("{}[{}]", var.name, show(size)),
                    None => var.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            match init {
                Some(init) => format!("{ty} {names} = {}", show(init)),
                None => format!("{ty} {names}"),
            }
        }
        StmtKind::Assign { targets, value } if targets.len() == 1 => {
            format!("{} = {}", show(&targets[0]), show(value))
        }
        StmtKind::Assign { targets, value } => format!("({}) = {}", list(targets), show(value)),
        StmtKind::Step { target, increment } => {
            format!("{}{}", show(target), if *increment { "++" } else { "--" })
        }
        StmtKind::Expr(expr) => show(expr),
        StmtKind::Return(values) if values.is_empty() => "return".to_string(),
        StmtKind::Return(values) => format!("return {}", list(values)),
        _ => render_stmt_with(stmt, 0, style),
    }
}

fn render_block(out: &mut String, body: &[Stmt], indent: usize, style: &dyn NameStyle) {
    for stmt in body {
        out.push_str(&render_stmt_with(stmt, indent + 1, style));
        out.push('\n');
    }
}

/// Renders a statement at the given indentation depth (two spaces per level).
pub fn render_stmt(stmt: &Stmt, indent: usize) -> String {
    render_stmt_with(stmt, indent, &Plain)
}

pub fn render_stmt_with(stmt: &Stmt, indent: usize, style: &dyn NameStyle) -> String {
    let pad = "  ".repeat(indent);
    let show = |expr: &Expr| Styled::new(expr, style).to_string();
    let mut out = String::new();
    for comment in &stmt.comments {
        out.push_str(&format!("{pad}# {comment}\n"));
    }
    match &stmt.kind {
        StmtKind::If {
            branches,
            otherwise,
        } => {
            for (idx, branch) in branches.iter().enumerate() {
                if idx == 0 {
                    out.push_str(&format!("{pad}if ({}) {{\n", show(&branch.cond)));
                } else {
                    out.push_str(&format!("{pad}}} else if ({}) {{\n", show(&branch.cond)));
                }
                render_block(&mut out, &branch.body, indent, style);
            }
            if let Some(body) = otherwise {
                out.push_str(&format!("{pad}}} else {{\n"));
                render_block(&mut out, body, indent, style);
            }
            out.push_str(&format!("{pad}}}"));
        }
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            out.push_str(&format!(
                "{pad}for ({}; {}; {}) {{\n",
                render_simple(init, style),
                show(cond),
                render_simple(update, style)
            ));
            render_block(&mut out, body, indent, style);
            out.push_str(&format!("{pad}}}"));
        }
        StmtKind::While { cond, body } => {
            out.push_str(&format!("{pad}while ({}) {{\n", show(cond)));
            render_block(&mut out, body, indent, style);
            out.push_str(&format!("{pad}}}"));
        }
        _ => {
            out.push_str(&pad);
            out.push_str(&render_simple(stmt, style));
            out.push(';');
        }
    }
    out
}

/// Renders a body as newline-separated statements.
pub fn render_body(body: &FunctionBody) -> String {
    render_body_with(body, &Plain)
}

pub fn render_body_with(body: &FunctionBody, style: &dyn NameStyle) -> String {
    body.statements
        .iter()
        .map(|stmt| render_stmt_with(stmt, 0, style))
        .collect::<Vec<_>>()
        .join("\n")
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_stmt(self, 0))
    }
}

impl fmt::Display for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_body(self))
    }
}
