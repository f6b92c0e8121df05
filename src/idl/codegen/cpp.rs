//! C++ backend.
//!
//! Emits statement-level code for the body of a hart method. Architectural state goes through
//! `__hart->` accessors, bit manipulation through helpers in the `idl::` runtime namespace.
//! Every width decision comes from the annotations left by the type checker.

use crate::idl::ast::{BinaryOp, CsrAccess, Expr, ExprKind, FunctionBody, Literal, Stmt, StmtKind, UnaryOp};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::eval;
use crate::idl::symbols::{SymbolTable, VarOrigin};
use crate::idl::types::{BitsType, Qualifiers, Type, Width, mask_for_width};

use super::{function_name, untyped};

const HART: &str = "__hart";

/// C++ statements for `body`, indented by `indent` levels of four spaces.
pub fn emit_cpp(body: &FunctionBody, symtab: &SymbolTable, indent: usize) -> IdlResult<String> {
    let mut emitter = CppEmitter {
        symtab,
        out: String::new(),
        indent,
        temps: 0,
    };
    emitter.block(&body.statements)?;
    Ok(emitter.out)
}

/// C++ spelling of an IDL type.
pub fn cpp_type(ty: &Type) -> IdlResult<String> {
    Ok(match ty {
        Type::Bits(bits) => storage(&bits.width, bits.is_signed()),
        Type::Boolean => "bool".into(),
        Type::String => "std::string".into(),
        Type::Enum(def) => def.name.to_string(),
        Type::Struct(def) => def.name.to_string(),
        Type::Bitfield(def) => storage(&Width::Fixed(def.width), false),
        Type::Array { element, size } => format!("std::array<{}, {size}>", cpp_type(element)?),
        Type::Tuple(items) => {
            let items = items.iter().map(cpp_type).collect::<IdlResult<Vec<_>>>()?;
            format!("std::tuple<{}>", items.join(", "))
        }
        Type::Void => "void".into(),
        Type::Function { .. } | Type::Csr(_) => {
            return Err(IdlError::Internal(format!("type {ty} has no C++ value representation")));
        }
    })
}

/// Integer storage for a bit vector: the narrowest native type, else the runtime `Bits` class.
fn storage(width: &Width, signed: bool) -> String {
    let Width::Fixed(bits) = width else {
        let class = if signed { "SignedBits" } else { "Bits" };
        return format!("idl::{class}<{}>", width_text(width));
    };
    let native = match bits {
        0..=8 => "int8_t",
        9..=16 => "int16_t",
        17..=32 => "int32_t",
        33..=64 => "int64_t",
        65..=128 => "__int128",
        _ => {
            let class = if signed { "SignedBits" } else { "Bits" };
            return format!("idl::{class}<{bits}>");
        }
    };
    match (signed, native) {
        (true, native) => native.to_string(),
        (false, "__int128") => "unsigned __int128".to_string(),
        (false, native) => format!("u{native}"),
    }
}

fn storage_bits(width: u32) -> Option<u32> {
    match width {
        0..=8 => Some(8),
        9..=16 => Some(16),
        17..=32 => Some(32),
        33..=64 => Some(64),
        65..=128 => Some(128),
        _ => None,
    }
}

/// Compile-time width, usable as a template argument.
fn width_text(width: &Width) -> String {
    match width {
        Width::Fixed(bits) => bits.to_string(),
        Width::Param { name, offset } if *offset == 0 => name.to_string(),
        Width::Param { name, offset } if *offset > 0 => format!("({name} + {offset})"),
        Width::Param { name, offset } => format!("({name} - {})", offset.unsigned_abs()),
    }
}

fn literal_text(value: u128) -> String {
    if value <= u128::from(u64::MAX) {
        format!("{value:#x}ull")
    } else {
        format!("idl::u128({:#x}ull, {:#x}ull)", value >> 64, value as u64)
    }
}

fn overflows(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Shl
            | BinaryOp::WideAdd
            | BinaryOp::WideSub
            | BinaryOp::WideMul
            | BinaryOp::WideShl
    )
}

struct CppEmitter<'a> {
    symtab: &'a SymbolTable,
    out: String,
    indent: usize,
    temps: usize,
}

impl CppEmitter<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, stmts: &[Stmt]) -> IdlResult<()> {
        self.indent += 1;
        let result = self.block(stmts);
        self.indent -= 1;
        result
    }

    fn block(&mut self, stmts: &[Stmt]) -> IdlResult<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> IdlResult<()> {
        if stmt.ty.is_none() {
            return Err(untyped(&stmt.span));
        }
        for comment in &stmt.comments {
            self.line(&format!("// {comment}"));
        }
        match &stmt.kind {
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (idx, branch) in branches.iter().enumerate() {
                    let cond = bare(self.expr(&branch.cond)?);
                    if idx == 0 {
                        self.line(&format!("if ({cond}) {{"));
                    } else {
                        self.line(&format!("}} else if ({cond}) {{"));
                    }
                    self.nested(&branch.body)?;
                }
                if let Some(body) = otherwise {
                    self.line("} else {");
                    self.nested(body)?;
                }
                self.line("}");
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let header = format!(
                    "for ({}; {}; {}) {{",
                    self.simple(init)?,
                    bare(self.expr(cond)?),
                    self.simple(update)?
                );
                self.line(&header);
                self.nested(body)?;
                self.line("}");
            }
            StmtKind::While { cond, body } => {
                let cond = bare(self.expr(cond)?);
                self.line(&format!("while ({cond}) {{"));
                self.nested(body)?;
                self.line("}");
            }
            StmtKind::Declare { vars, .. } if vars.len() > 1 => {
                for idx in 0..vars.len() {
                    let text = self.declaration(stmt, idx)?;
                    self.line(&format!("{text};"));
                }
            }
            StmtKind::Assign { targets, value } if targets.len() > 1 => self.multi_assign(targets, value)?,
            _ => {
                let text = self.simple(stmt)?;
                self.line(&format!("{text};"));
            }
        }
        Ok(())
    }

    /// Single-line statement without the trailing `;`, as in `for` headers.
    fn simple(&mut self, stmt: &Stmt) -> IdlResult<String> {
        match &stmt.kind {
            StmtKind::Declare { .. } => self.declaration(stmt, 0),
            StmtKind::Assign { targets, value } => match targets.as_slice() {
                [target] => {
                    let value = bare(self.expr(value)?);
                    self.write(target, value)
                }
                _ => Err(IdlError::Internal(format!(
                    "multi-target assignment at {} cannot appear in a header",
                    stmt.span
                ))),
            },
            StmtKind::Step { target, increment } => {
                let ty = self.ty(target)?;
                let read = self.expr(target)?;
                let op = if *increment { "+" } else { "-" };
                let next = self.wrap(format!("({read} {op} 1)"), ty)?;
                self.write(target, bare(next))
            }
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Return(values) => match values.as_slice() {
                [] => Ok("return".into()),
                [value] => Ok(format!("return {}", bare(self.expr(value)?))),
                values => {
                    let items = values.iter().map(|value| self.expr(value)).collect::<IdlResult<Vec<_>>>()?;
                    Ok(format!("return std::make_tuple({})", items.join(", ")))
                }
            },
            StmtKind::If { .. } | StmtKind::For { .. } | StmtKind::While { .. } => Err(IdlError::Internal(format!(
                "compound statement at {} used where a simple one is required",
                stmt.span
            ))),
        }
    }

    fn declaration(&mut self, stmt: &Stmt, idx: usize) -> IdlResult<String> {
        let StmtKind::Declare { vars, init, .. } = &stmt.kind else {
            return Err(IdlError::Internal(format!("not a declaration at {}", stmt.span)));
        };
        let declared = stmt.ty.as_ref().ok_or_else(|| untyped(&stmt.span))?;
        let var = &vars[idx];
        let base = cpp_type(&declared.clone().without_qualifiers(Qualifiers::CONST | Qualifiers::UNSIZED))?;
        let ty = match &var.array {
            Some(size) => {
                let size = eval::evaluate(size, self.symtab)
                    .and_then(|value| value.as_integer())
                    .ok_or_else(|| IdlError::Internal(format!("array size at {} is not constant", size.span)))?;
                format!("std::array<{base}, {size}>")
            }
            None => base,
        };
        let qualifier = if declared.is_const() { "const " } else { "" };
        match init {
            Some(init) => Ok(format!("{qualifier}{ty} {} = {}", var.name, bare(self.expr(init)?))),
            None if var.array.is_some() => Ok(format!("{ty} {}{{}}", var.name)),
            None => Ok(format!("{ty} {} = 0", var.name)),
        }
    }

    fn multi_assign(&mut self, targets: &[Expr], value: &Expr) -> IdlResult<()> {
        let value = self.expr(value)?;
        if targets.iter().all(|target| matches!(target.kind, ExprKind::Var(_))) {
            let names = targets.iter().map(|target| self.expr(target)).collect::<IdlResult<Vec<_>>>()?;
            self.line(&format!("std::tie({}) = {value};", names.join(", ")));
            return Ok(());
        }
        let temp = format!("__tuple{}", self.temps);
        self.temps += 1;
        self.line(&format!("auto {temp} = {value};"));
        for (idx, target) in targets.iter().enumerate() {
            let text = self.write(target, format!("std::get<{idx}>({temp})"))?;
            self.line(&format!("{text};"));
        }
        Ok(())
    }

    /// Statement storing `value` into `target`.
    fn write(&mut self, target: &Expr, value: String) -> IdlResult<String> {
        match &target.kind {
            ExprKind::Var(name) => Ok(format!("{name} = {value}")),
            ExprKind::Index { base, index } if is_register_file(base) => {
                Ok(format!("{HART}->set_xreg({}, {value})", self.expr(index)?))
            }
            ExprKind::Index { base, index } if matches!(self.ty(base)?, Type::Array { .. }) => {
                Ok(format!("{}[{}] = {value}", self.expr(base)?, self.expr(index)?))
            }
            ExprKind::Index { base, index } => {
                let update = format!("idl::set_bit({}, {}, {value})", self.expr(base)?, self.expr(index)?);
                self.write(base, update)
            }
            ExprKind::Slice { base, hi, lo } => {
                let update = format!(
                    "idl::set_bits({}, {}, {}, {value})",
                    self.expr(base)?,
                    self.expr(hi)?,
                    self.expr(lo)?
                );
                self.write(base, update)
            }
            ExprKind::Member { base, field } => match self.ty(base)? {
                Type::Bitfield(def) => {
                    let range = def
                        .field(field)
                        .map(|field| field.range)
                        .ok_or_else(|| IdlError::Internal(format!("no field {field} in {}", def.name)))?;
                    let update = format!(
                        "idl::set_bits({}, {}, {}, {value})",
                        self.expr(base)?,
                        range.msb,
                        range.lsb
                    );
                    self.write(base, update)
                }
                _ => Ok(format!("{}.{field} = {value}", self.expr(base)?)),
            },
            ExprKind::Csr { csr, access } => match access {
                CsrAccess::Value => Ok(format!("{HART}->csr_{csr}().hw_write({value})")),
                CsrAccess::Field(field) => Ok(format!("{HART}->csr_{csr}().{field}().hw_write({value})")),
                CsrAccess::Method { .. } => Err(IdlError::Internal(format!("cannot assign to `{target}`"))),
            },
            _ => Err(IdlError::Internal(format!("cannot assign to `{target}` at {}", target.span))),
        }
    }

    fn ty<'e>(&self, expr: &'e Expr) -> IdlResult<&'e Type> {
        expr.ty.as_ref().ok_or_else(|| untyped(&expr.span))
    }

    /// Narrows an arithmetic result back into its declared width.
    fn wrap(&self, text: String, ty: &Type) -> IdlResult<String> {
        let Type::Bits(bits) = ty else {
            return Ok(text);
        };
        if bits.is_unsized() {
            return Ok(text);
        }
        let Width::Fixed(width) = bits.width else {
            return Ok(format!("idl::mask<{}>({text})", width_text(&bits.width)));
        };
        let Some(native) = storage_bits(width) else {
            return Ok(text);
        };
        let cpp = cpp_type(ty)?;
        // `ull` constants promote narrower operands to 64 bits.
        Ok(match (width == native, bits.is_signed()) {
            (true, _) if native >= 64 => text,
            (true, _) => format!("static_cast<{cpp}>({})", bare(text)),
            (false, true) => format!("static_cast<{cpp}>(idl::sext<{width}>({}))", bare(text)),
            (false, false) if width <= 64 => {
                format!("static_cast<{cpp}>({text} & {:#x}ull)", mask_for_width(width))
            }
            (false, false) => format!("idl::mask<{width}>({text})"),
        })
    }

    fn expr(&mut self, expr: &Expr) -> IdlResult<String> {
        let ty = self.ty(expr)?;
        Ok(match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal, ty)?,
            ExprKind::Bool(flag) => flag.to_string(),
            ExprKind::String(text) => format!("{text:?}"),
            ExprKind::Var(name) => self.var(name)?,
            ExprKind::EnumMember { member, ty: written } => match ty {
                Type::Enum(def) => format!("{}::{member}", def.name),
                _ => format!("{written}::{member}"),
            },
            ExprKind::Unary { op, expr: operand } => {
                let inner = self.expr(operand)?;
                match op {
                    UnaryOp::Not => format!("(!{inner})"),
                    UnaryOp::Neg => self.wrap(format!("(-{inner})"), ty)?,
                    UnaryOp::BitNot => self.wrap(format!("(~{inner})"), ty)?,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, ty)?,
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => format!("({} ? {} : {})", self.expr(cond)?, self.expr(then)?, self.expr(otherwise)?),
            ExprKind::Index { base, index } if is_register_file(base) => {
                format!("{HART}->xreg({})", self.expr(index)?)
            }
            ExprKind::Index { base, index } => match self.ty(base)? {
                Type::Array { .. } => format!("{}[{}]", self.expr(base)?, self.expr(index)?),
                _ => format!("idl::bit({}, {})", self.expr(base)?, self.expr(index)?),
            },
            ExprKind::Slice { base, hi, lo } => format!(
                "idl::extract({}, {}, {})",
                self.expr(base)?,
                self.expr(hi)?,
                self.expr(lo)?
            ),
            ExprKind::Concat(items) => {
                let parts = items
                    .iter()
                    .map(|item| {
                        let width = self.width_of(item)?;
                        Ok(format!("idl::sized<{width}>({})", self.expr(item)?))
                    })
                    .collect::<IdlResult<Vec<_>>>()?;
                format!("idl::concat({})", parts.join(", "))
            }
            ExprKind::Replicate { count, expr: operand } => format!(
                "idl::replicate<{}>({}, {})",
                self.width_of(operand)?,
                self.expr(operand)?,
                self.expr(count)?
            ),
            ExprKind::Member { base, field } => match self.ty(base)? {
                Type::Bitfield(def) => {
                    let range = def
                        .field(field)
                        .map(|field| field.range)
                        .ok_or_else(|| IdlError::Internal(format!("no field {field} in {}", def.name)))?;
                    format!("idl::extract({}, {}, {})", self.expr(base)?, range.msb, range.lsb)
                }
                _ => format!("{}.{field}", self.expr(base)?),
            },
            ExprKind::Call {
                function,
                templates,
                args,
            } => self.call(function, templates, args)?,
            ExprKind::Builtin { name, args } => self.builtin(expr, name, args, ty)?,
            ExprKind::Csr { csr, access } => self.csr(csr, access, expr)?,
        })
    }

    fn width_of(&self, expr: &Expr) -> IdlResult<String> {
        self.ty(expr)?
            .bit_width()
            .map(|width| width_text(&width))
            .ok_or_else(|| IdlError::Internal(format!("`{expr}` has no bit width")))
    }

    fn literal(&self, literal: &Literal, ty: &Type) -> IdlResult<String> {
        let text = literal_text(literal.value);
        if ty.is_unsized() {
            return Ok(text);
        }
        Ok(format!("static_cast<{}>({text})", cpp_type(ty)?))
    }

    fn var(&self, name: &str) -> IdlResult<String> {
        let var = self.symtab.lookup_var(name);
        if let Some(value) = var
            .and_then(|var| var.value.as_ref())
            .filter(|_| name == "XLEN")
            .and_then(|value| value.as_integer())
        {
            return Ok(value.to_string());
        }
        Ok(match var.map(|var| var.origin) {
            Some(VarOrigin::ArchParam) if name == "XLEN" => format!("{HART}->xlen()"),
            Some(VarOrigin::ArchParam) => format!("{HART}->param_{name}()"),
            _ => name.to_string(),
        })
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, ty: &Type) -> IdlResult<String> {
        let lt = self.ty(lhs)?.clone();
        let rt = self.ty(rhs)?.clone();
        let mut left = self.expr(lhs)?;
        let right = self.expr(rhs)?;
        let signed = |t: &Type| t.as_bits().is_some_and(BitsType::is_signed);

        if op.is_widening() {
            left = format!("static_cast<{}>({left})", cpp_type(ty)?);
        }
        let text = match op {
            BinaryOp::Sra => {
                let width = lt
                    .bit_width()
                    .map(|width| width_text(&width))
                    .ok_or_else(|| IdlError::Internal(format!("`{lhs}` has no bit width")))?;
                return self.wrap(format!("idl::sra<{width}>({left}, {right})"), ty);
            }
            BinaryOp::Shr if signed(&lt) && !lt.is_unsized() => return self.logical_shift(&lt, left, right, ty),
            op if op.is_comparison() && (signed(&lt) || signed(&rt)) && !(lt.is_unsized() && rt.is_unsized()) => {
                format!("(idl::as_signed({left}) {} idl::as_signed({right}))", op.symbol())
            }
            op => {
                let symbol = match op {
                    BinaryOp::WideShl => "<<",
                    BinaryOp::WideAdd => "+",
                    BinaryOp::WideSub => "-",
                    BinaryOp::WideMul => "*",
                    other => other.symbol(),
                };
                format!("({left} {symbol} {right})")
            }
        };
        if overflows(op) {
            self.wrap(text, ty)
        } else {
            Ok(text)
        }
    }

    /// `>>` shifts in zeros even when the operand is signed.
    fn logical_shift(&self, lt: &Type, left: String, right: String, ty: &Type) -> IdlResult<String> {
        let width = lt
            .bit_width()
            .ok_or_else(|| IdlError::Internal(format!("`{left}` has no bit width")))?;
        let native = match width {
            Width::Fixed(bits) if bits <= 64 => storage_bits(bits).map(|native| (bits, native)),
            _ => None,
        };
        let Some((bits, native)) = native else {
            return self.wrap(format!("idl::srl<{}>({left}, {right})", width_text(&width)), ty);
        };
        let unsigned = storage(&width, false);
        if bits == native {
            return Ok(format!(
                "static_cast<{}>(static_cast<{unsigned}>({}) >> {right})",
                cpp_type(ty)?,
                bare(left)
            ));
        }
        let operand = format!("(static_cast<{unsigned}>({}) & {:#x}ull)", bare(left), mask_for_width(bits));
        self.wrap(format!("({operand} >> {right})"), ty)
    }

    fn call(&mut self, function: &str, templates: &[Expr], args: &[Expr]) -> IdlResult<String> {
        let decl = self
            .symtab
            .lookup_function(function)
            .cloned()
            .ok_or_else(|| IdlError::Internal(format!("call to unknown function {function}")))?;
        let templates = templates
            .iter()
            .map(|item| {
                eval::evaluate(item, self.symtab)
                    .and_then(|value| value.as_integer())
                    .map(|value| value.to_string())
                    .map_or_else(|| self.expr(item), Ok)
            })
            .collect::<IdlResult<Vec<_>>>()?;
        let args = args
            .iter()
            .map(|item| self.expr(item).map(bare))
            .collect::<IdlResult<Vec<_>>>()?;
        let name = function_name(function);
        let callee = if decl.builtin { format!("{HART}->{name}") } else { name };
        let templates = if templates.is_empty() {
            String::new()
        } else {
            format!("<{}>", templates.join(", "))
        };
        Ok(format!("{callee}{templates}({})", args.join(", ")))
    }

    fn builtin(&mut self, expr: &Expr, name: &str, args: &[Expr], ty: &Type) -> IdlResult<String> {
        if matches!(name, "width" | "enum_size" | "array_size") {
            if let Some(value) = eval::evaluate(expr, self.symtab).and_then(|value| value.as_integer()) {
                return Ok(value.to_string());
            }
        }
        let [arg] = args else {
            return Err(IdlError::Internal(format!("${name} at {} takes one argument", expr.span)));
        };
        let inner = self.expr(arg)?;
        Ok(match name {
            "bits" => format!("static_cast<{}>({inner})", cpp_type(ty)?),
            "signed" => format!("static_cast<{}>(idl::as_signed({inner}))", cpp_type(ty)?),
            "array_size" => format!("{inner}.size()"),
            "width" => self.width_of(arg)?,
            other => {
                return Err(IdlError::Internal(format!(
                    "${other} at {} has no C++ lowering",
                    expr.span
                )));
            }
        })
    }

    fn csr(&mut self, csr: &str, access: &CsrAccess, expr: &Expr) -> IdlResult<String> {
        Ok(match access {
            CsrAccess::Value => format!("{HART}->csr_{csr}().hw_read()"),
            CsrAccess::Field(field) => format!("{HART}->csr_{csr}().{field}().hw_read()"),
            CsrAccess::Method { name, args } => {
                if name == "address" {
                    let address = self
                        .symtab
                        .csr(csr)
                        .and_then(|csr| csr.address)
                        .ok_or_else(|| IdlError::Internal(format!("CSR {csr} has no address at {}", expr.span)))?;
                    return Ok(format!("{address:#x}"));
                }
                let args = args.iter().map(|item| self.expr(item)).collect::<IdlResult<Vec<_>>>()?;
                format!("{HART}->csr_{csr}().{name}({})", args.join(", "))
            }
        })
    }
}

fn is_register_file(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Var(name) if name == "X")
}

/// Drops one pair of parentheses enclosing the whole expression.
fn bare(text: String) -> String {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'(') || bytes.last() != Some(&b')') {
        return text;
    }
    let mut depth = 0usize;
    for (idx, byte) in bytes.iter().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 && idx + 1 < bytes.len() {
                    return text;
                }
            }
            _ => {}
        }
    }
    text[1..text.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::symbols::Variable;
    use crate::idl::test_support::{body, symtab_full};
    use crate::idl::typeck::{self, Returns};

    fn emit(text: &str, symtab: &mut SymbolTable) -> String {
        let mut parsed = body(text);
        typeck::check_body(&mut parsed, symtab, Returns::Forbidden).expect("checks");
        emit_cpp(&parsed, symtab, 0).expect("emits")
    }

    fn decode_scope(xlen: u64) -> SymbolTable {
        let mut symtab = symtab_full(&["I", "Sm"], xlen);
        symtab.push();
        for field in ["rs1", "rs2", "rd"] {
            symtab
                .add_var(field, Variable::new(Type::bits(5), VarOrigin::DecodeField).immutable())
                .expect("decode field");
        }
        symtab
    }

    #[test]
    fn native_widths_map_to_fixed_integers() {
        assert_eq!(cpp_type(&Type::bits(8)).expect("u8"), "uint8_t");
        assert_eq!(cpp_type(&Type::bits(12)).expect("u16"), "uint16_t");
        assert_eq!(cpp_type(&Type::bits(64)).expect("u64"), "uint64_t");
        assert_eq!(cpp_type(&Type::bits(100)).expect("u128"), "unsigned __int128");
        assert_eq!(cpp_type(&Type::bits(256)).expect("wide"), "idl::Bits<256>");
        assert_eq!(
            cpp_type(&Type::bits(32).with_qualifiers(Qualifiers::SIGNED)).expect("signed"),
            "int32_t"
        );
        assert_eq!(cpp_type(&Type::bits_of(Width::param("XLEN"))).expect("xlen"), "idl::Bits<XLEN>");
    }

    #[test]
    fn register_file_accesses_use_hart_accessors() {
        let mut symtab = decode_scope(64);
        let out = emit("X[rd] = X[rs1] + X[rs2];", &mut symtab);
        assert_eq!(out.trim(), "__hart->set_xreg(rd, __hart->xreg(rs1) + __hart->xreg(rs2));");
    }

    #[test]
    fn non_native_arithmetic_is_masked() {
        let mut symtab = decode_scope(64);
        let out = emit("Bits<12> a = 0; a = a + 1;", &mut symtab);
        assert!(out.contains("uint16_t a = 0x0ull;"), "{out}");
        assert!(out.contains("a = static_cast<uint16_t>((a + 0x1ull) & 0xfffull);"), "{out}");
    }

    #[test]
    fn narrow_native_arithmetic_is_cast_back() {
        let mut symtab = decode_scope(32);
        let out = emit("XReg v = X[rs1];\nif ((v - 1) == 32'hffffffff) { X[rd] = v << 1; }", &mut symtab);
        assert!(
            out.contains("if (static_cast<uint32_t>(v - 0x1ull) == static_cast<uint32_t>(0xffffffffull)) {"),
            "{out}"
        );
        assert!(out.contains("__hart->set_xreg(rd, static_cast<uint32_t>(v << 0x1ull));"), "{out}");
    }

    #[test]
    fn logical_right_shift_of_signed_values_shifts_in_zeros() {
        let mut symtab = decode_scope(64);
        let out = emit("signed Bits<32> s = 0;\ns = s >> 4;\nsigned Bits<12> t = 0;\nt = t >> 4;", &mut symtab);
        assert!(out.contains("s = static_cast<int32_t>(static_cast<uint32_t>(s) >> 0x4ull);"), "{out}");
        assert!(
            out.contains("t = static_cast<int16_t>(idl::sext<12>((static_cast<uint16_t>(t) & 0xfffull) >> 0x4ull));"),
            "{out}"
        );
    }

    #[test]
    fn control_flow_keeps_its_shape() {
        let mut symtab = decode_scope(32);
        let out = emit(
            "# count down\nXReg v = X[rs1];\nwhile (v != 0) {\n  v = v - 1;\n}\nif (v == 0) { X[rd] = v; } else { X[rd] = 1; }",
            &mut symtab,
        );
        let expected = "// count down\nuint32_t v = __hart->xreg(rs1);\nwhile (v != 0x0ull) {\n    v = static_cast<uint32_t>(v - 0x1ull);\n}\nif (v == 0x0ull) {\n    __hart->set_xreg(rd, v);\n} else {\n    __hart->set_xreg(rd, 0x1ull);\n}\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn calls_and_csrs() {
        let mut symtab = decode_scope(64);
        let out = emit(
            "Bits<32> w = read_memory<32>(X[rs1]);\nBits<2> mxl = CSR[misa].MXL;\nif (implemented?(Extension::Sm)) { w = 0; }",
            &mut symtab,
        );
        assert!(out.contains("uint32_t w = __hart->read_memory<32>(__hart->xreg(rs1));"), "{out}");
        assert!(out.contains("uint8_t mxl = __hart->csr_misa().MXL().hw_read();"), "{out}");
        assert!(out.contains("__hart->implemented_Q(ExtensionName::Sm)"), "{out}");
    }

    #[test]
    fn untyped_trees_are_rejected() {
        let symtab = decode_scope(64);
        let err = emit_cpp(&body("X[rd] = 0;"), &symtab, 0).expect_err("untyped");
        assert!(matches!(err, IdlError::Internal(_)));
    }
}
