use crate::arch::{Csr, CsrField, CsrLength};
use crate::idl::SourceSpan;
use crate::idl::ast::{BinaryOp, CsrAccess, Expr, ExprKind, Literal, LiteralWidth, TypeExpr, UnaryOp};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::eval;
use crate::idl::symbols::{Symbol, VarOrigin, Variable};
use crate::idl::types::{BitsType, Qualifiers, Type, Width, bit_length};
use crate::idl::value::Value;

use super::{TypeChecker, assignable, normalize, resolve_type_expr, substitute};

/// Bit vector view of a type: bitfields behave as plain vectors of their width.
fn bits_view(ty: &Type) -> Option<BitsType> {
    match ty {
        Type::Bits(bits) => Some(bits.clone()),
        Type::Bitfield(def) => Some(BitsType::new(Width::Fixed(def.width))),
        _ => None,
    }
}

/// Result type of an operator over sized operands: never `CONST`.
fn value_type(bits: BitsType) -> Type {
    Type::Bits(bits).without_qualifiers(Qualifiers::CONST)
}

fn unsized_width(bits: &BitsType) -> u32 {
    bits.width.fixed().unwrap_or(1)
}

impl TypeChecker<'_> {
    pub(super) fn check_expr(&mut self, expr: &mut Expr) -> IdlResult<Type> {
        let ty = self.infer(expr)?;
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn infer(&mut self, expr: &mut Expr) -> IdlResult<Type> {
        let span = expr.span.clone();
        match &mut expr.kind {
            ExprKind::Literal(literal) => self.literal_type(literal, &span),
            ExprKind::Bool(_) => Ok(Type::Boolean),
            ExprKind::String(_) => Ok(Type::String),
            ExprKind::Var(name) => match self.symtab.get(name) {
                Ok(Symbol::Variable(var)) => Ok(normalize(var.ty.clone(), self.symtab)),
                Ok(other) => Err(IdlError::type_error(
                    "typeck.not-a-value",
                    format!("'{name}' is a {}, not a value", other.kind_name()),
                    &span,
                )),
                Err(err) => Err(IdlError::symbol(err, &span)),
            },
            ExprKind::EnumMember { ty, member } => match self.symtab.lookup_type(ty) {
                Some(Type::Enum(def)) if def.member(member).is_some() => Ok(Type::Enum(def.clone())),
                Some(Type::Enum(_)) => Err(IdlError::type_error(
                    "typeck.unknown-member",
                    format!("enum '{ty}' has no member '{member}'"),
                    &span,
                )),
                _ => Err(IdlError::type_error(
                    "typeck.unknown-enum",
                    format!("'{ty}' is not an enum"),
                    &span,
                )),
            },
            ExprKind::Unary { op, expr: operand } => {
                let op = *op;
                let ty = self.check_expr(operand)?;
                self.unary(op, ty, &span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                self.binary(op, lt, rt, lhs, rhs, &span)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let ct = self.check_expr(cond)?;
                if ct != Type::Boolean {
                    return Err(IdlError::type_error(
                        "typeck.condition",
                        format!("condition must be Boolean, found {ct}"),
                        &cond.span,
                    ));
                }
                let tt = self.check_expr(then)?;
                let ot = self.check_expr(otherwise)?;
                self.unify(tt, ot, &span)
            }
            ExprKind::Index { base, index } => {
                let bt = self.check_expr(base)?;
                let it = self.check_expr(index)?;
                if bits_view(&it).is_none() {
                    return Err(IdlError::type_error(
                        "typeck.index",
                        format!("index must be a bit vector, found {it}"),
                        &index.span,
                    ));
                }
                let constant = eval::evaluate(index, self.symtab).and_then(|v| v.as_integer());
                let (bound, result) = match &bt {
                    Type::Array { element, size } => (Some(*size), normalize((**element).clone(), self.symtab)),
                    other => match bits_view(other) {
                        Some(bits) => (bits.width.fixed(), Type::bits(1)),
                        None => {
                            return Err(IdlError::type_error(
                                "typeck.index",
                                format!("cannot index {bt}"),
                                &span,
                            ));
                        }
                    },
                };
                if let (Some(idx), Some(bound)) = (constant, bound) {
                    if idx >= u128::from(bound) {
                        return Err(IdlError::type_error(
                            "typeck.index-out-of-range",
                            format!("index {idx} is out of range for {bt}"),
                            &index.span,
                        ));
                    }
                }
                Ok(result)
            }
            ExprKind::Slice { base, hi, lo } => {
                let bt = self.check_expr(base)?;
                self.check_expr(hi)?;
                self.check_expr(lo)?;
                let bits = bits_view(&bt).ok_or_else(|| {
                    IdlError::type_error("typeck.slice", format!("cannot take a bit range of {bt}"), &span)
                })?;
                self.slice_type(&bits, hi, lo, &span)
            }
            ExprKind::Concat(items) => {
                let mut width = Width::Fixed(0);
                for item in items.iter_mut() {
                    let ty = self.check_expr(item)?;
                    let bits = match &ty {
                        Type::Boolean => BitsType::new(Width::Fixed(1)),
                        other => bits_view(other).ok_or_else(|| {
                            IdlError::type_error(
                                "typeck.concat",
                                format!("cannot concatenate {ty}"),
                                &item.span,
                            )
                        })?,
                    };
                    if bits.is_unsized() {
                        return Err(IdlError::type_error(
                            "typeck.unsized-concat",
                            format!("concatenation operands need a known width, found constant {item}"),
                            &item.span,
                        ));
                    }
                    width = width.add(&bits.width).ok_or_else(|| symbolic_width(&span))?;
                }
                Ok(Type::bits_of(width))
            }
            ExprKind::Replicate { count, expr: operand } => {
                self.check_expr(count)?;
                let repeat = match eval::evaluate(count, self.symtab) {
                    Some(value) => value
                        .as_integer()
                        .and_then(|n| u32::try_from(n).ok())
                        .map(Width::Fixed),
                    None => eval::const_width(count, self.symtab),
                }
                .filter(|n| *n != Width::Fixed(0))
                .ok_or_else(|| {
                    IdlError::type_error(
                        "typeck.replication-count",
                        "replication count must be a positive compile-time constant",
                        &count.span,
                    )
                })?;
                let ty = self.check_expr(operand)?;
                let bits = bits_view(&ty).filter(|bits| !bits.is_unsized()).ok_or_else(|| {
                    IdlError::type_error(
                        "typeck.replicate",
                        format!("cannot replicate {ty}"),
                        &operand.span,
                    )
                })?;
                let width = match (&repeat, &bits.width) {
                    (Width::Fixed(n), Width::Fixed(w)) => w.checked_mul(*n).map(Width::Fixed),
                    (Width::Fixed(1), w) | (w, Width::Fixed(1)) => Some(w.clone()),
                    _ => None,
                };
                width.map(Type::bits_of).ok_or_else(|| symbolic_width(&span))
            }
            ExprKind::Member { base, field } => {
                let bt = self.check_expr(base)?;
                let found = match &bt {
                    Type::Bitfield(def) => def.field(field).map(|f| Type::bits(f.range.width())),
                    Type::Struct(def) => def.field(field).map(|f| f.ty.clone()),
                    _ => None,
                };
                found.map(|ty| normalize(ty, self.symtab)).ok_or_else(|| {
                    IdlError::type_error("typeck.no-member", format!("{bt} has no member '{field}'"), &span)
                })
            }
            ExprKind::Call {
                function,
                templates,
                args,
            } => {
                let function = function.clone();
                self.call(&function, templates, args, &span)
            }
            ExprKind::Builtin { name, args } => {
                let name = name.clone();
                self.builtin(&name, args, &span)
            }
            ExprKind::Csr { csr, access } => {
                let csr = csr.clone();
                self.csr(&csr, access, &span)
            }
        }
    }

    fn literal_type(&self, literal: &Literal, span: &SourceSpan) -> IdlResult<Type> {
        let qualifiers = if literal.signed {
            Qualifiers::SIGNED
        } else {
            Qualifiers::empty()
        };
        let width = match &literal.width {
            None => return Ok(Type::unsized_const(bit_length(literal.value))),
            Some(LiteralWidth::Fixed(width)) => Width::Fixed(*width),
            Some(LiteralWidth::Param(name)) => {
                match self.symtab.param_value(name).and_then(|v| v.as_integer()) {
                    Some(width) => Width::Fixed(u32::try_from(width).map_err(|_| {
                        IdlError::type_error("typeck.literal", format!("width {width} is too large"), span)
                    })?),
                    None if self.symtab.lookup_var(name).is_some() => Width::param(name.as_str()),
                    None => {
                        return Err(IdlError::type_error(
                            "typeck.literal",
                            format!("literal width '{name}' is not an architecture parameter"),
                            span,
                        ));
                    }
                }
            }
        };
        if let Width::Fixed(width) = width {
            if width < 128 && literal.value >> width != 0 {
                return Err(IdlError::type_error(
                    "typeck.constant-too-wide",
                    format!("value {} does not fit in {width} bits", literal.value),
                    span,
                ));
            }
        }
        Ok(Type::Bits(BitsType { width, qualifiers }))
    }

    fn unary(&self, op: UnaryOp, ty: Type, span: &SourceSpan) -> IdlResult<Type> {
        match op {
            UnaryOp::Not if ty == Type::Boolean => Ok(Type::Boolean),
            UnaryOp::Neg | UnaryOp::BitNot => match bits_view(&ty) {
                Some(bits) if bits.is_unsized() => Ok(Type::Bits(bits)),
                Some(bits) => Ok(value_type(bits)),
                None => Err(IdlError::type_error(
                    "typeck.operand",
                    format!("operator `{}` needs a bit vector, found {ty}", op.symbol()),
                    span,
                )),
            },
            UnaryOp::Not => Err(IdlError::type_error(
                "typeck.logical",
                format!("operator `!` needs a Boolean, found {ty}"),
                span,
            )),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        lt: Type,
        rt: Type,
        lhs: &Expr,
        rhs: &Expr,
        span: &SourceSpan,
    ) -> IdlResult<Type> {
        if op.is_logical() {
            if lt != Type::Boolean || rt != Type::Boolean {
                return Err(IdlError::type_error(
                    "typeck.logical",
                    format!("operator `{}` needs Boolean operands, found {lt} and {rt}", op.symbol()),
                    span,
                ));
            }
            return Ok(Type::Boolean);
        }
        if op.is_comparison() {
            return self.comparison(op, &lt, &rt, span).map(|_| Type::Boolean);
        }

        let (Some(l), Some(r)) = (bits_view(&lt), bits_view(&rt)) else {
            return Err(IdlError::type_error(
                "typeck.operand",
                format!("operator `{}` needs bit vector operands, found {lt} and {rt}", op.symbol()),
                span,
            ));
        };

        if matches!(op, BinaryOp::Div | BinaryOp::Rem)
            && eval::evaluate(rhs, self.symtab)
                .and_then(|v| v.as_bits().map(|bits| bits.is_zero()))
                .unwrap_or(false)
        {
            return Err(IdlError::type_error(
                "typeck.divide-by-zero",
                format!("division by zero in `{}`", op.symbol()),
                span,
            ));
        }

        if op.is_shift() {
            return Ok(if l.is_unsized() { Type::Bits(l) } else { value_type(l) });
        }
        if op.is_widening() {
            return self.widening(op, l, r, rhs, span);
        }

        match (l.is_unsized(), r.is_unsized()) {
            (true, true) => Ok(Type::unsized_const(unsized_width(&l).max(unsized_width(&r)))),
            (true, false) => {
                self.check_fits(lhs, &r)?;
                Ok(value_type(r))
            }
            (false, true) => {
                self.check_fits(rhs, &l)?;
                Ok(value_type(l))
            }
            (false, false) => {
                if l.width != r.width {
                    return Err(IdlError::type_error(
                        "typeck.width-mismatch",
                        format!("width mismatch: {} vs {} in `{}`", l.width, r.width, op.symbol()),
                        span,
                    ));
                }
                let signed = l.is_signed() && r.is_signed();
                Ok(Type::Bits(BitsType {
                    width: l.width,
                    qualifiers: if signed { Qualifiers::SIGNED } else { Qualifiers::empty() },
                }))
            }
        }
    }

    /// An unsized constant operand must fit the width of the sized side.
    pub(super) fn check_fits(&self, constant: &Expr, target: &BitsType) -> IdlResult<()> {
        let Some(Value::Bits(value)) = eval::evaluate(constant, self.symtab) else {
            return Ok(());
        };
        let widths: Vec<u32> = match &target.width {
            Width::Fixed(width) => vec![*width],
            symbolic => self
                .symtab
                .possible_xlens()
                .into_iter()
                .filter_map(|xlen| symbolic.evaluate("XLEN", xlen))
                .collect(),
        };
        let Some(width) = widths.into_iter().min() else {
            return Ok(());
        };
        let needed = if value.signed && value.as_i128() < 0 {
            value.required_width()
        } else {
            bit_length(value.value)
        };
        if needed > width {
            return Err(IdlError::type_error(
                "typeck.constant-too-wide",
                format!("constant {} does not fit in Bits<{}>", Value::Bits(value), target.width),
                &constant.span,
            ));
        }
        Ok(())
    }

    fn comparison(&self, op: BinaryOp, lt: &Type, rt: &Type, span: &SourceSpan) -> IdlResult<()> {
        let ordered = !matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        let ok = match (lt, rt) {
            (l, r) if bits_view(l).is_some() && bits_view(r).is_some() => true,
            (Type::Enum(l), Type::Enum(r)) => l.name == r.name,
            (Type::Boolean, Type::Boolean) | (Type::String, Type::String) => !ordered,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(IdlError::type_error(
                "typeck.comparison",
                format!("cannot compare {lt} with {rt} using `{}`", op.symbol()),
                span,
            ))
        }
    }

    fn widening(
        &self,
        op: BinaryOp,
        l: BitsType,
        r: BitsType,
        rhs: &Expr,
        span: &SourceSpan,
    ) -> IdlResult<Type> {
        let width = match op {
            BinaryOp::WideShl => {
                let shift = eval::evaluate(rhs, self.symtab)
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| {
                        IdlError::type_error(
                            "typeck.non-constant",
                            "shift amount of `` `<< `` must be a compile-time constant",
                            &rhs.span,
                        )
                    })?;
                let width = i64::try_from(shift).ok().and_then(|shift| l.width.offset_by(shift));
                return width.map(Type::bits_of).ok_or_else(|| {
                    IdlError::type_error(
                        "typeck.wide-shift",
                        format!("`` `<< `` by {shift} exceeds the widest bit vector"),
                        span,
                    )
                });
            }
            BinaryOp::WideMul => l.width.add(&r.width),
            _ => {
                let widest = match (l.is_unsized(), r.is_unsized()) {
                    (true, true) => Some(Width::Fixed(unsized_width(&l).max(unsized_width(&r)))),
                    (true, false) => Some(r.width.clone()),
                    (false, true) => Some(l.width.clone()),
                    (false, false) => match (&l.width, &r.width) {
                        (Width::Fixed(a), Width::Fixed(b)) => Some(Width::Fixed(*a.max(b))),
                        (a, b) if a == b => Some(a.clone()),
                        _ => None,
                    },
                };
                widest.and_then(|w| w.offset_by(1))
            }
        };
        width.map(Type::bits_of).ok_or_else(|| symbolic_width(span))
    }

    fn unify(&self, then: Type, otherwise: Type, span: &SourceSpan) -> IdlResult<Type> {
        if let (Type::Bits(t), Type::Bits(o)) = (&then, &otherwise) {
            return match (t.is_unsized(), o.is_unsized()) {
                (true, true) => Ok(Type::unsized_const(unsized_width(t).max(unsized_width(o)))),
                (true, false) => Ok(value_type(o.clone())),
                (false, true) => Ok(value_type(t.clone())),
                (false, false) => match (&t.width, &o.width) {
                    (a, b) if a == b => Ok(value_type(t.clone())),
                    (Width::Fixed(a), Width::Fixed(b)) => Ok(Type::bits(*a.max(b))),
                    _ => Err(IdlError::type_error(
                        "typeck.ternary-mismatch",
                        format!("branches of `?:` have types {then} and {otherwise}"),
                        span,
                    )),
                },
            };
        }
        if then.same_shape(&otherwise) {
            Ok(then)
        } else {
            Err(IdlError::type_error(
                "typeck.ternary-mismatch",
                format!("branches of `?:` have types {then} and {otherwise}"),
                span,
            ))
        }
    }

    fn slice_type(
        &self,
        base: &BitsType,
        hi: &Expr,
        lo: &Expr,
        span: &SourceSpan,
    ) -> IdlResult<Type> {
        let (Some(hi_w), Some(lo_w)) = (
            eval::const_width(hi, self.symtab),
            eval::const_width(lo, self.symtab),
        ) else {
            return Err(IdlError::type_error(
                "typeck.non-constant-range",
                "bit range bounds must be compile-time constants",
                span,
            ));
        };
        if let (Width::Fixed(h), Width::Fixed(l)) = (&hi_w, &lo_w) {
            if h < l {
                return Err(IdlError::type_error(
                    "typeck.reversed-range",
                    format!("bit range [{h}:{l}] is reversed"),
                    span,
                ));
            }
            if let Width::Fixed(width) = base.width {
                if *h >= width {
                    return Err(IdlError::type_error(
                        "typeck.range-out-of-bounds",
                        format!("bit {h} is out of range for Bits<{width}>"),
                        span,
                    ));
                }
            }
        }
        let width = hi_w
            .sub(&lo_w)
            .and_then(|w| w.offset_by(1))
            .ok_or_else(|| {
                IdlError::type_error(
                    "typeck.range",
                    format!("cannot compute the width of [{hi_w}:{lo_w}]"),
                    span,
                )
            })?;
        Ok(Type::bits_of(width))
    }

    fn call(
        &mut self,
        function: &str,
        templates: &mut [Expr],
        args: &mut [Expr],
        span: &SourceSpan,
    ) -> IdlResult<Type> {
        let decl = match self.symtab.get(function) {
            Ok(Symbol::Function(decl)) => decl.clone(),
            Ok(other) => {
                return Err(IdlError::type_error(
                    "typeck.not-a-function",
                    format!("'{function}' is a {}, not a function", other.kind_name()),
                    span,
                ));
            }
            Err(err) => return Err(IdlError::symbol(err, span)),
        };
        if decl.templates.len() != templates.len() {
            return Err(IdlError::type_error(
                "typeck.template-arity",
                format!(
                    "function '{function}' expects {} template arguments, found {}",
                    decl.templates.len(),
                    templates.len()
                ),
                span,
            ));
        }
        if decl.params.len() != args.len() {
            return Err(IdlError::type_error(
                "typeck.arity",
                format!(
                    "function '{function}' expects {} arguments, found {}",
                    decl.params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let mut bindings = Vec::with_capacity(templates.len());
        for (template, formal) in templates.iter_mut().zip(&decl.templates) {
            self.check_expr(template)?;
            let value = eval::evaluate(template, self.symtab);
            let symbolic = match &value {
                Some(_) => None,
                None => Some(eval::const_width(template, self.symtab).ok_or_else(|| {
                    IdlError::type_error(
                        "typeck.non-constant",
                        format!("template argument '{}' must be a compile-time constant", formal.name),
                        &template.span,
                    )
                })?),
            };
            bindings.push((formal, value, symbolic));
        }

        // Signature types are resolved with the template arguments bound.
        let signature = self.scoped(|checker| {
            for (formal, value, _) in &bindings {
                let ty = resolve_type_expr(&formal.ty, checker.symtab)?.with_qualifiers(Qualifiers::CONST);
                let var = Variable::new(ty, VarOrigin::Parameter)
                    .immutable()
                    .with_value(value.clone());
                checker
                    .symtab
                    .add_var(&formal.name, var)
                    .map_err(|err| IdlError::symbol(err, span))?;
            }
            let resolve_all = |types: Vec<&TypeExpr>, checker: &Self| {
                types
                    .into_iter()
                    .map(|ty| {
                        let mut resolved = resolve_type_expr(ty, checker.symtab)?;
                        for (formal, _, symbolic) in &bindings {
                            if let Some(width) = symbolic {
                                resolved = substitute(&resolved, &formal.name, width);
                            }
                        }
                        Ok(normalize(resolved, checker.symtab))
                    })
                    .collect::<IdlResult<Vec<Type>>>()
            };
            let params = resolve_all(decl.params.iter().map(|p| &p.ty).collect(), checker)?;
            let returns = resolve_all(decl.returns.iter().collect(), checker)?;
            Ok((params, returns))
        });
        let (params, mut returns) = signature?;

        for (idx, (arg, param)) in args.iter_mut().zip(&params).enumerate() {
            let at = self.check_expr(arg)?;
            if !assignable(&at, param, self.symtab) {
                return Err(IdlError::type_error(
                    "typeck.argument",
                    format!("argument {} of '{function}': cannot pass {at} as {param}", idx + 1),
                    &arg.span,
                ));
            }
            if let (true, Some(target)) = (at.is_unsized(), param.as_bits()) {
                self.check_fits(arg, target)?;
            }
        }

        Ok(match returns.len() {
            0 => Type::Void,
            1 => returns.remove(0),
            _ => Type::Tuple(returns),
        })
    }

    fn builtin(&mut self, name: &str, args: &mut [Expr], span: &SourceSpan) -> IdlResult<Type> {
        let [arg] = args else {
            return Err(IdlError::type_error(
                "typeck.arity",
                format!("${name} takes exactly one argument"),
                span,
            ));
        };
        if name == "enum_size" {
            let ExprKind::Var(enum_name) = &arg.kind else {
                return Err(IdlError::type_error("typeck.builtin", "$enum_size expects an enum type", span));
            };
            let def = match self.symtab.lookup_type(enum_name) {
                Some(Type::Enum(def)) => def.clone(),
                _ => {
                    return Err(IdlError::type_error(
                        "typeck.builtin",
                        format!("$enum_size expects an enum type, found '{enum_name}'"),
                        span,
                    ));
                }
            };
            let size = def.members.len() as u128;
            arg.ty = Some(Type::Enum(def));
            return Ok(Type::unsized_const(bit_length(size)));
        }

        let ty = self.check_expr(arg)?;
        let invalid = || {
            IdlError::type_error("typeck.builtin", format!("${name} cannot be applied to {ty}"), span)
        };
        match name {
            "bits" => match &ty {
                Type::Bits(bits) => Ok(Type::Bits(bits.clone()).without_qualifiers(Qualifiers::SIGNED | Qualifiers::CONST)),
                other => other.bit_width().map(Type::bits_of).ok_or_else(invalid),
            },
            "signed" => match bits_view(&ty) {
                Some(bits) => Ok(Type::Bits(bits).with_qualifiers(Qualifiers::SIGNED)),
                None => Err(invalid()),
            },
            "width" => match ty.bit_width() {
                Some(Width::Fixed(width)) => Ok(Type::unsized_const(bit_length(u128::from(width)))),
                Some(_) => Ok(Type::unsized_const(8)),
                None => Err(invalid()),
            },
            "array_size" => match &ty {
                Type::Array { size, .. } => Ok(Type::unsized_const(bit_length(u128::from(*size)))),
                _ => Err(invalid()),
            },
            _ => Err(IdlError::type_error(
                "typeck.unknown-builtin",
                format!("unknown builtin '${name}'"),
                span,
            )),
        }
    }

    fn csr(&mut self, name: &str, access: &mut CsrAccess, span: &SourceSpan) -> IdlResult<Type> {
        let csr = self.symtab.csr(name).cloned().ok_or_else(|| {
            IdlError::type_error("typeck.unknown-csr", format!("CSR '{name}' is not defined"), span)
        })?;
        if self.symtab.csr_excluded(&csr) {
            return Err(IdlError::type_error(
                "typeck.csr-excluded",
                format!(
                    "CSR '{name}' requires extension '{}', which configuration '{}' excludes",
                    csr.defined_by,
                    self.symtab.config().name
                ),
                span,
            ));
        }
        match access {
            CsrAccess::Value => Ok(Type::bits_of(self.csr_width(&csr))),
            CsrAccess::Field(field) => {
                let found = csr.field(field).ok_or_else(|| {
                    IdlError::type_error(
                        "typeck.unknown-csr-field",
                        format!("CSR '{name}' has no field '{field}'"),
                        span,
                    )
                })?;
                self.field_width(&csr, found, span).map(Type::bits_of)
            }
            CsrAccess::Method { name: method, args } => match (method.as_str(), args.as_mut_slice()) {
                ("sw_read", []) => Ok(Type::bits_of(self.csr_width(&csr))),
                ("address", []) => Ok(Type::bits(12)),
                ("sw_write", [value]) => {
                    let vt = self.check_expr(value)?;
                    let target = Type::bits_of(self.csr_width(&csr));
                    if !assignable(&vt, &target, self.symtab) {
                        return Err(IdlError::type_error(
                            "typeck.argument",
                            format!("cannot write {vt} to CSR '{name}' of type {target}"),
                            &value.span,
                        ));
                    }
                    Ok(Type::Void)
                }
                (other, args) => Err(IdlError::type_error(
                    "typeck.unknown-csr-method",
                    format!("CSR '{name}' has no method '{other}' taking {} arguments", args.len()),
                    span,
                )),
            },
        }
    }

    fn csr_width(&self, csr: &Csr) -> Width {
        match (csr.length, self.symtab.xlen()) {
            (CsrLength::Fixed(width), _) => Width::Fixed(width),
            (CsrLength::Xlen, Some(xlen)) => Width::Fixed(xlen),
            (CsrLength::Xlen, None) => Width::param("XLEN"),
        }
    }

    /// Width of a field, which must agree across every XLEN the design can run at.
    fn field_width(&self, csr: &Csr, field: &CsrField, span: &SourceSpan) -> IdlResult<Width> {
        if let Some(xlen) = self.symtab.xlen() {
            return Ok(Width::Fixed(field.width_for(xlen)));
        }
        let widths: Vec<(u32, u32)> = self
            .symtab
            .possible_xlens()
            .into_iter()
            .map(|xlen| (xlen, field.width_for(xlen)))
            .collect();
        match widths.as_slice() {
            [] => Ok(Width::Fixed(field.width_for(64))),
            [(_, first), rest @ ..] if rest.iter().all(|(_, w)| w == first) => Ok(Width::Fixed(*first)),
            all if all.iter().all(|(xlen, w)| xlen == w) => Ok(Width::param("XLEN")),
            [(x0, w0), rest @ ..] => {
                let (x1, w1) = rest.iter().find(|(_, w)| w != w0).copied().unwrap_or((*x0, *w0));
                Err(IdlError::type_error(
                    "typeck.csr-field-xlen",
                    format!(
                        "field {}.{} has width {w0} at XLEN={x0} but {w1} at XLEN={x1}",
                        csr.name, field.name
                    ),
                    span,
                ))
            }
        }
    }
}

fn symbolic_width(span: &SourceSpan) -> IdlError {
    IdlError::type_error(
        "typeck.symbolic-width",
        "result width depends on more than one unresolved parameter",
        span,
    )
}
