//! Abstract syntax tree produced by the IDL parser.
//!
//! Nodes own their children. Every expression and statement has a `ty` slot that stays `None`
//! until the type checker annotates it; pruning allocates fresh nodes instead of rewriting these.

mod fmt;

use crate::idl::diagnostic::SourceSpan;
use crate::idl::types::Type;
use crate::idl::value::Value;

pub use fmt::{NameStyle, Styled, render_body, render_body_with, render_stmt, render_stmt_with};

/// Width written in front of a Verilog-style literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralWidth {
    Fixed(u32),
    /// Sized by an architecture parameter, e.g. `XLEN'b0`.
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub value: u128,
    /// `None` for plain decimal/hex literals, which are unsized.
    pub width: Option<LiteralWidth>,
    pub signed: bool,
    /// Source spelling, reproduced by the printers.
    pub text: String,
}

impl Literal {
    pub fn unsized_value(value: u128) -> Self {
        Self {
            value,
            width: None,
            signed: false,
            text: value.to_string(),
        }
    }

    pub fn sized(value: u128, width: u32) -> Self {
        Self {
            value,
            width: Some(LiteralWidth::Fixed(width)),
            signed: false,
            text: format!("{width}'d{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Sra,
    WideShl,
    Add,
    Sub,
    WideAdd,
    WideSub,
    Mul,
    WideMul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::LogicalOr => "||",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Sra => ">>>",
            BinaryOp::WideShl => "`<<",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::WideAdd => "`+",
            BinaryOp::WideSub => "`-",
            BinaryOp::Mul => "*",
            BinaryOp::WideMul => "`*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::LogicalOr => 1,
            BinaryOp::LogicalAnd => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra | BinaryOp::WideShl => 8,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::WideAdd | BinaryOp::WideSub => 9,
            BinaryOp::Mul | BinaryOp::WideMul | BinaryOp::Div | BinaryOp::Rem => 10,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalOr | BinaryOp::LogicalAnd)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra)
    }

    pub fn is_widening(self) -> bool {
        matches!(
            self,
            BinaryOp::WideShl | BinaryOp::WideAdd | BinaryOp::WideSub | BinaryOp::WideMul
        )
    }
}

/// How a `CSR[name]` reference is used.
#[derive(Debug, Clone, PartialEq)]
pub enum CsrAccess {
    /// The whole register value.
    Value,
    Field(String),
    /// `CSR[name].sw_read()`, `CSR[name].address()`, ...
    Method { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Bool(bool),
    String(String),
    Var(String),
    EnumMember {
        ty: String,
        member: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        base: Box<Expr>,
        hi: Box<Expr>,
        lo: Box<Expr>,
    },
    Concat(Vec<Expr>),
    Replicate {
        count: Box<Expr>,
        expr: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
    },
    Call {
        function: String,
        templates: Vec<Expr>,
        args: Vec<Expr>,
    },
    /// `$bits(...)`, `$signed(...)` and friends; `name` excludes the `$`.
    Builtin {
        name: String,
        args: Vec<Expr>,
    },
    Csr {
        csr: String,
        access: CsrAccess,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn var(name: impl Into<String>, span: SourceSpan) -> Self {
        Self::new(ExprKind::Var(name.into()), span)
    }

    /// Literal node for a folded constant.
    pub fn from_value(value: &Value, span: SourceSpan) -> Self {
        let kind = match value {
            Value::Bool(flag) => ExprKind::Bool(*flag),
            Value::String(text) => ExprKind::String(text.to_string()),
            Value::Enum(member) => ExprKind::EnumMember {
                ty: member.ty.name.to_string(),
                member: member.member.to_string(),
            },
            Value::Bits(bits) => {
                let negative = bits.signed && bits.as_i128() < 0;
                match (bits.width, negative) {
                    (Some(width), _) => ExprKind::Literal(Literal {
                        value: bits.value,
                        width: Some(LiteralWidth::Fixed(width)),
                        signed: bits.signed,
                        text: format!("{width}'{}d{}", if bits.signed { "s" } else { "" }, bits.value),
                    }),
                    (None, true) => {
                        let magnitude = bits.as_i128().unsigned_abs();
                        ExprKind::Unary {
                            op: UnaryOp::Neg,
                            expr: Box::new(Expr::new(
                                ExprKind::Literal(Literal::unsized_value(magnitude)),
                                span.clone(),
                            )),
                        }
                    }
                    (None, false) => ExprKind::Literal(Literal::unsized_value(bits.value)),
                }
            }
        };
        Self::new(kind, span)
    }

    /// Calls `visit` on this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Var(_)
            | ExprKind::EnumMember { .. } => {}
            ExprKind::Unary { expr, .. } => expr.walk(visit),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
            ExprKind::Index { base, index } => {
                base.walk(visit);
                index.walk(visit);
            }
            ExprKind::Slice { base, hi, lo } => {
                base.walk(visit);
                hi.walk(visit);
                lo.walk(visit);
            }
            ExprKind::Concat(items) => items.iter().for_each(|item| item.walk(visit)),
            ExprKind::Replicate { count, expr } => {
                count.walk(visit);
                expr.walk(visit);
            }
            ExprKind::Member { base, .. } => base.walk(visit),
            ExprKind::Call {
                templates, args, ..
            } => {
                templates.iter().for_each(|item| item.walk(visit));
                args.iter().for_each(|item| item.walk(visit));
            }
            ExprKind::Builtin { args, .. } => args.iter().for_each(|item| item.walk(visit)),
            ExprKind::Csr { access, .. } => {
                if let CsrAccess::Method { args, .. } = access {
                    args.iter().for_each(|item| item.walk(visit));
                }
            }
        }
    }
}

/// Type as written in source: `Bits<expr>` or a named type, optionally `signed`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeRef,
    pub signed: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Bits(Box<Expr>),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub array: Option<Expr>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Declare {
        ty: TypeExpr,
        vars: Vec<Declarator>,
        init: Option<Expr>,
    },
    /// Single or multi-target (`(a, b) = f();`) assignment.
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    /// `x++` / `x--`.
    Step {
        target: Expr,
        increment: bool,
    },
    Expr(Expr),
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Stmt>>,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        update: Box<Stmt>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
    /// `#` comments immediately preceding the statement.
    pub comments: Vec<String>,
    /// Declared type for declarations, `Void` for other checked statements.
    pub ty: Option<Type>,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: SourceSpan) -> Self {
        Self {
            kind,
            span,
            comments: Vec::new(),
            ty: None,
        }
    }

    /// Visits every expression reachable from this statement, including nested blocks.
    pub fn walk_exprs<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        match &self.kind {
            StmtKind::Declare { ty, vars, init } => {
                if let TypeRef::Bits(width) = &ty.kind {
                    width.walk(visit);
                }
                for var in vars {
                    if let Some(size) = &var.array {
                        size.walk(visit);
                    }
                }
                if let Some(init) = init {
                    init.walk(visit);
                }
            }
            StmtKind::Assign { targets, value } => {
                targets.iter().for_each(|target| target.walk(visit));
                value.walk(visit);
            }
            StmtKind::Step { target, .. } => target.walk(visit),
            StmtKind::Expr(expr) => expr.walk(visit),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    branch.cond.walk(visit);
                    branch.body.iter().for_each(|stmt| stmt.walk_exprs(visit));
                }
                if let Some(body) = otherwise {
                    body.iter().for_each(|stmt| stmt.walk_exprs(visit));
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                init.walk_exprs(visit);
                cond.walk(visit);
                update.walk_exprs(visit);
                body.iter().for_each(|stmt| stmt.walk_exprs(visit));
            }
            StmtKind::While { cond, body } => {
                cond.walk(visit);
                body.iter().for_each(|stmt| stmt.walk_exprs(visit));
            }
            StmtKind::Return(values) => values.iter().for_each(|value| value.walk(visit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    pub statements: Vec<Stmt>,
    pub span: SourceSpan,
}

impl FunctionBody {
    pub fn walk_exprs<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        self.statements.iter().for_each(|stmt| stmt.walk_exprs(visit));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberDecl {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMemberDecl>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitfieldFieldDecl {
    pub name: String,
    pub msb: Expr,
    pub lsb: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitfieldDecl {
    pub name: String,
    pub width: Expr,
    pub fields: Vec<BitfieldFieldDecl>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Param>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeExpr,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub templates: Vec<Param>,
    pub returns: Vec<TypeExpr>,
    pub params: Vec<Param>,
    pub description: Option<String>,
    /// Absent for `builtin function` declarations.
    pub body: Option<FunctionBody>,
    pub builtin: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Enum(EnumDecl),
    Bitfield(BitfieldDecl),
    Struct(StructDecl),
    Function(FunctionDecl),
    /// Global constant declaration.
    Constant(Stmt),
}

/// A file of global declarations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdlFile {
    pub items: Vec<Item>,
}
