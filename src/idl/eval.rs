//! Compile-time evaluation of IDL expressions.
//!
//! Evaluation is partial: anything that depends on run-time state, or on a parameter the
//! configuration leaves open, yields `None`. Widths beyond 128 bits are never folded.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::arch::config::parse_requirement;
use crate::idl::ast::{BinaryOp, Expr, ExprKind, Literal, LiteralWidth, UnaryOp};
use crate::idl::symbols::{SymbolTable, VarOrigin};
use crate::idl::types::{MAX_FOLD_WIDTH, Type, Width, mask_for_width};
use crate::idl::value::{BitsValue, EnumValue, Value};

pub fn evaluate(expr: &Expr, symtab: &SymbolTable) -> Option<Value> {
    match &expr.kind {
        ExprKind::Literal(literal) => literal_value(literal, symtab),
        ExprKind::Bool(flag) => Some(Value::Bool(*flag)),
        ExprKind::String(text) => Some(Value::String(Arc::from(text.as_str()))),
        ExprKind::Var(name) => symtab.lookup_var(name).and_then(|var| var.value.clone()),
        ExprKind::EnumMember { ty, member } => enum_value(ty, member, symtab),
        ExprKind::Unary { op, expr } => unary(*op, evaluate(expr, symtab)?),
        ExprKind::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, symtab),
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            if evaluate(cond, symtab)?.as_bool()? {
                evaluate(then, symtab)
            } else {
                evaluate(otherwise, symtab)
            }
        }
        ExprKind::Index { base, index } => {
            let base = sized(evaluate(base, symtab)?)?;
            let index = u32::try_from(evaluate(index, symtab)?.as_integer()?).ok()?;
            if index >= base.width? {
                return None;
            }
            Some(Value::Bits(BitsValue::sized(base.value >> index, 1)))
        }
        ExprKind::Slice { base, hi, lo } => {
            let base = sized(evaluate(base, symtab)?)?;
            let hi = u32::try_from(evaluate(hi, symtab)?.as_integer()?).ok()?;
            let lo = u32::try_from(evaluate(lo, symtab)?.as_integer()?).ok()?;
            if hi < lo || hi >= base.width? {
                return None;
            }
            Some(Value::Bits(BitsValue::sized(base.value >> lo, hi - lo + 1)))
        }
        ExprKind::Concat(items) => {
            let mut value = 0u128;
            let mut width = 0u32;
            for item in items {
                let part = sized(evaluate(item, symtab)?)?;
                let part_width = part.width?;
                width = width.checked_add(part_width).filter(|w| *w <= MAX_FOLD_WIDTH)?;
                value = (value.checked_shl(part_width).unwrap_or(0)) | part.value;
            }
            Some(Value::Bits(BitsValue::sized(value, width)))
        }
        ExprKind::Replicate { count, expr } => {
            let count = u32::try_from(evaluate(count, symtab)?.as_integer()?).ok()?;
            let part = sized(evaluate(expr, symtab)?)?;
            let part_width = part.width?;
            let width = part_width.checked_mul(count).filter(|w| *w <= MAX_FOLD_WIDTH && *w > 0)?;
            let value = (0..count).fold(0u128, |acc, _| {
                acc.checked_shl(part_width).unwrap_or(0) | part.value
            });
            Some(Value::Bits(BitsValue::sized(value, width)))
        }
        ExprKind::Member { .. } | ExprKind::Csr { .. } => None,
        ExprKind::Call { function, args, .. } => call(function, args, symtab),
        ExprKind::Builtin { name, args } => builtin(name, args, symtab),
    }
}

/// Width denoted by an expression: a constant, or a symbolic parameter plus an offset.
pub fn const_width(expr: &Expr, symtab: &SymbolTable) -> Option<Width> {
    if let Some(value) = evaluate(expr, symtab) {
        return u32::try_from(value.as_integer()?).ok().map(Width::Fixed);
    }
    match &expr.kind {
        ExprKind::Var(name) => {
            let var = symtab.lookup_var(name)?;
            let symbolic = var.value.is_none()
                && !var.mutable
                && matches!(var.origin, VarOrigin::ArchParam | VarOrigin::Parameter);
            symbolic.then(|| Width::param(name.as_str()))
        }
        ExprKind::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        } => const_width(lhs, symtab)?.add(&const_width(rhs, symtab)?),
        ExprKind::Binary {
            op: BinaryOp::Sub,
            lhs,
            rhs,
        } => const_width(lhs, symtab)?.sub(&const_width(rhs, symtab)?),
        _ => None,
    }
}

fn sized(value: Value) -> Option<BitsValue> {
    match value {
        Value::Bits(bits) if bits.width.is_some() => Some(bits),
        Value::Bool(flag) => Some(BitsValue::sized(u128::from(flag), 1)),
        _ => None,
    }
}

fn literal_value(literal: &Literal, symtab: &SymbolTable) -> Option<Value> {
    let width = match &literal.width {
        None => return Some(Value::unsized_int(literal.value)),
        Some(LiteralWidth::Fixed(width)) => *width,
        Some(LiteralWidth::Param(name)) => u32::try_from(symtab.param_value(name)?.as_integer()?).ok()?,
    };
    if width > MAX_FOLD_WIDTH {
        return None;
    }
    let mut bits = BitsValue::sized(literal.value, width);
    bits.signed = literal.signed;
    Some(Value::Bits(bits))
}

fn enum_value(ty: &str, member: &str, symtab: &SymbolTable) -> Option<Value> {
    let Type::Enum(def) = symtab.lookup_type(ty)? else {
        return None;
    };
    let found = def.member(member)?;
    Some(Value::Enum(EnumValue {
        ty: def.clone(),
        member: found.name.clone(),
        value: found.value,
    }))
}

fn unary(op: UnaryOp, value: Value) -> Option<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(flag)) => Some(Value::Bool(!flag)),
        (UnaryOp::Neg, Value::Bits(bits)) => match bits.width {
            Some(width) => Some(Value::Bits(BitsValue {
                value: 0u128.wrapping_sub(bits.value) & mask_for_width(width),
                ..bits
            })),
            None => Some(Value::Bits(BitsValue::signed_unsized(bits.as_i128().checked_neg()?))),
        },
        (UnaryOp::BitNot, Value::Bits(bits)) => {
            let width = bits.width?;
            Some(Value::Bits(BitsValue {
                value: !bits.value & mask_for_width(width),
                ..bits
            }))
        }
        _ => None,
    }
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, symtab: &SymbolTable) -> Option<Value> {
    if op.is_logical() {
        let lhs = evaluate(lhs, symtab)?.as_bool()?;
        return match (op, lhs) {
            (BinaryOp::LogicalAnd, false) => Some(Value::Bool(false)),
            (BinaryOp::LogicalOr, true) => Some(Value::Bool(true)),
            _ => Some(Value::Bool(evaluate(rhs, symtab)?.as_bool()?)),
        };
    }
    let lhs = evaluate(lhs, symtab)?;
    let rhs = evaluate(rhs, symtab)?;
    if op.is_comparison() {
        return compare(op, &lhs, &rhs).map(Value::Bool);
    }
    let lhs = lhs.as_bits()?;
    let rhs = rhs.as_bits()?;
    if op.is_widening() {
        return widening(op, lhs, rhs).map(Value::Bits);
    }
    if op.is_shift() {
        // The shift amount never widens the result.
        return match lhs.width {
            None => unsized_arith(op, lhs, rhs).map(Value::Bits),
            Some(width) => sized_arith(op, lhs, rhs, width, lhs.signed).map(Value::Bits),
        };
    }
    match (lhs.width, rhs.width) {
        (None, None) => unsized_arith(op, lhs, rhs).map(Value::Bits),
        (Some(width), _) | (None, Some(width)) => {
            let signed = lhs.signed && (rhs.signed || rhs.width.is_none());
            sized_arith(op, lhs, rhs, width, signed).map(Value::Bits)
        }
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Bits(l), Value::Bits(r)) => {
            if l.signed || r.signed {
                l.as_i128().cmp(&r.as_i128())
            } else {
                l.value.cmp(&r.value)
            }
        }
        (Value::Enum(l), Value::Enum(r)) if l.ty.name == r.ty.name => l.value.cmp(&r.value),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => return None,
    };
    Some(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return None,
    })
}

fn unsized_arith(op: BinaryOp, lhs: &BitsValue, rhs: &BitsValue) -> Option<BitsValue> {
    let (l, r) = (lhs.as_i128(), rhs.as_i128());
    let result = match op {
        BinaryOp::Add => l.checked_add(r)?,
        BinaryOp::Sub => l.checked_sub(r)?,
        BinaryOp::Mul => l.checked_mul(r)?,
        BinaryOp::Div => l.checked_div(r)?,
        BinaryOp::Rem => l.checked_rem(r)?,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Shl => {
            let shift = u32::try_from(r).ok().filter(|s| *s < 127)?;
            l.checked_mul(1i128 << shift)?
        }
        BinaryOp::Shr | BinaryOp::Sra => l >> u32::try_from(r).ok()?.min(127),
        _ => return None,
    };
    Some(BitsValue::signed_unsized(result))
}

fn sized_arith(
    op: BinaryOp,
    lhs: &BitsValue,
    rhs: &BitsValue,
    width: u32,
    signed: bool,
) -> Option<BitsValue> {
    let mask = mask_for_width(width);
    let (l, r) = (lhs.value & mask, rhs.value & mask);
    let as_signed = |bits: &BitsValue| BitsValue {
        signed: true,
        ..bits.with_width(Some(width))
    };
    let value = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div | BinaryOp::Rem if r == 0 => return None,
        BinaryOp::Div if signed => as_signed(lhs).as_i128().checked_div(as_signed(rhs).as_i128())? as u128,
        BinaryOp::Rem if signed => as_signed(lhs).as_i128().checked_rem(as_signed(rhs).as_i128())? as u128,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Shl => match u32::try_from(rhs.value) {
            Ok(shift) if shift < width => l << shift,
            _ => 0,
        },
        BinaryOp::Shr => match u32::try_from(rhs.value) {
            Ok(shift) if shift < 128 => l >> shift,
            _ => 0,
        },
        BinaryOp::Sra => {
            let shift = u32::try_from(rhs.value).unwrap_or(u32::MAX).min(127);
            (as_signed(lhs).as_i128() >> shift) as u128
        }
        _ => return None,
    };
    Some(BitsValue {
        value: value & mask,
        width: Some(width),
        signed,
    })
}

fn widening(op: BinaryOp, lhs: &BitsValue, rhs: &BitsValue) -> Option<BitsValue> {
    let lw = lhs.width.unwrap_or_else(|| lhs.required_width());
    let rw = rhs.width.unwrap_or_else(|| rhs.required_width());
    let (width, value) = match op {
        BinaryOp::WideAdd => (lw.max(rw) + 1, lhs.value.wrapping_add(rhs.value)),
        BinaryOp::WideSub => (lw.max(rw) + 1, lhs.value.wrapping_sub(rhs.value)),
        BinaryOp::WideMul => (lw + rw, lhs.value.wrapping_mul(rhs.value)),
        BinaryOp::WideShl => {
            let shift = u32::try_from(rhs.value).ok()?;
            (lw.checked_add(shift)?, lhs.value.checked_shl(shift)?)
        }
        _ => return None,
    };
    if width > MAX_FOLD_WIDTH {
        return None;
    }
    Some(BitsValue::sized(value, width))
}

fn call(function: &str, args: &[Expr], symtab: &SymbolTable) -> Option<Value> {
    match function {
        "implemented?" => {
            let Value::Enum(ext) = evaluate(args.first()?, symtab)? else {
                return None;
            };
            symtab.extension_presence(&ext.member).known().map(Value::Bool)
        }
        "implemented_version?" => {
            let Value::Enum(ext) = evaluate(args.first()?, symtab)? else {
                return None;
            };
            let Value::String(requirement) = evaluate(args.get(1)?, symtab)? else {
                return None;
            };
            let requirement = parse_requirement(&requirement).ok()?;
            symtab
                .extension_version_presence(&ext.member, &requirement)
                .known()
                .map(Value::Bool)
        }
        _ => None,
    }
}

fn builtin(name: &str, args: &[Expr], symtab: &SymbolTable) -> Option<Value> {
    let arg = args.first()?;
    match name {
        "bits" => match evaluate(arg, symtab)? {
            Value::Enum(member) => Some(Value::Bits(BitsValue::sized(
                member.value,
                member.ty.element_width(),
            ))),
            Value::Bool(flag) => Some(Value::Bits(BitsValue::sized(u128::from(flag), 1))),
            Value::Bits(bits) => Some(Value::Bits(BitsValue {
                signed: false,
                ..bits
            })),
            Value::String(_) => None,
        },
        "signed" => match evaluate(arg, symtab)? {
            Value::Bits(bits) => Some(Value::Bits(BitsValue {
                signed: true,
                ..bits
            })),
            _ => None,
        },
        "width" => {
            let width = arg.ty.as_ref()?.bit_width()?.fixed()?;
            Some(Value::unsized_int(u128::from(width)))
        }
        "enum_size" => match &arg.kind {
            ExprKind::Var(name) => match symtab.lookup_type(name)? {
                Type::Enum(def) => Some(Value::unsized_int(def.members.len() as u128)),
                _ => None,
            },
            _ => None,
        },
        "array_size" => match arg.ty.as_ref()? {
            Type::Array { size, .. } => Some(Value::unsized_int(u128::from(*size))),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::test_support::{expr, symtab_full};

    #[test]
    fn folds_sized_arithmetic_with_wraparound() {
        let symtab = symtab_full(&["I"], 64);
        let value = evaluate(&expr("8'hff + 8'h02"), &symtab).expect("constant");
        assert_eq!(value, Value::Bits(BitsValue::sized(1, 8)));
        let value = evaluate(&expr("4'b1000 >>> 2"), &symtab);
        assert_eq!(value, Some(Value::Bits(BitsValue::sized(0b1110, 4))), "arithmetic shift replicates the sign bit");
        let value = evaluate(&expr("4'b1000 >> 2"), &symtab);
        assert_eq!(value, Some(Value::Bits(BitsValue::sized(0b0010, 4))));
    }

    #[test]
    fn unsized_arithmetic_is_exact() {
        let symtab = symtab_full(&["I"], 64);
        assert_eq!(
            evaluate(&expr("XLEN - 1"), &symtab),
            Some(Value::Bits(BitsValue::signed_unsized(63)))
        );
        assert_eq!(
            evaluate(&expr("3 - 5"), &symtab),
            Some(Value::Bits(BitsValue::signed_unsized(-2)))
        );
        assert_eq!(evaluate(&expr("1 / 0"), &symtab), None);
    }

    #[test]
    fn shift_width_follows_the_shifted_operand() {
        let symtab = symtab_full(&["I"], 64);
        assert_eq!(
            evaluate(&expr("1 << 3'd4"), &symtab),
            Some(Value::Bits(BitsValue::signed_unsized(16)))
        );
        assert_eq!(
            evaluate(&expr("8'h80 >> 3'd7"), &symtab),
            Some(Value::Bits(BitsValue::sized(1, 8)))
        );
        assert_eq!(
            evaluate(&expr("4'b0001 << 32'd3"), &symtab),
            Some(Value::Bits(BitsValue::sized(0b1000, 4)))
        );
    }

    #[test]
    fn slices_concatenations_and_replication() {
        let symtab = symtab_full(&["I"], 64);
        assert_eq!(
            evaluate(&expr("8'b1010_0101[7:4]"), &symtab),
            Some(Value::Bits(BitsValue::sized(0b1010, 4)))
        );
        assert_eq!(
            evaluate(&expr("{2'b10, 2'b01}"), &symtab),
            Some(Value::Bits(BitsValue::sized(0b1001, 4)))
        );
        assert_eq!(
            evaluate(&expr("{3{1'b1}}"), &symtab),
            Some(Value::Bits(BitsValue::sized(0b111, 3)))
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        let symtab = symtab_full(&["I"], 64);
        assert_eq!(evaluate(&expr("false && unknown_thing"), &symtab), Some(Value::Bool(false)));
        assert_eq!(evaluate(&expr("true || unknown_thing"), &symtab), Some(Value::Bool(true)));
        assert_eq!(evaluate(&expr("true && unknown_thing"), &symtab), None);
    }

    #[test]
    fn implemented_follows_configuration() {
        let symtab = symtab_full(&["I", "M"], 64);
        assert_eq!(evaluate(&expr("implemented?(Extension::M)"), &symtab), Some(Value::Bool(true)));
        assert_eq!(evaluate(&expr("implemented?(Extension::Q)"), &symtab), Some(Value::Bool(false)));
        assert_eq!(
            evaluate(&expr("implemented_version?(Extension::I, \">=2.0\")"), &symtab),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn symbolic_widths_track_xlen() {
        let symtab = crate::idl::test_support::symtab_generic();
        assert_eq!(
            const_width(&expr("XLEN - 1"), &symtab),
            Some(Width::Param {
                name: Arc::from("XLEN"),
                offset: -1
            })
        );
        assert_eq!(const_width(&expr("XLEN - (XLEN - 8)"), &symtab), Some(Width::Fixed(8)));
    }
}
