//! Assignability: implicit widening, never truncation.

use crate::idl::symbols::SymbolTable;
use crate::idl::types::{BitsType, Type, Width};

/// Whether a value of type `from` may be stored in a binding of type `to`.
pub fn assignable(from: &Type, to: &Type, symtab: &SymbolTable) -> bool {
    match (from, to) {
        (Type::Bits(f), Type::Bits(t)) => bits_assignable(f, t, symtab),
        (Type::Bitfield(f), Type::Bits(t)) => width_le(&Width::Fixed(f.width), &t.width, symtab),
        (Type::Bits(f), Type::Bitfield(t)) => {
            f.is_unsized() || width_le(&f.width, &Width::Fixed(t.width), symtab)
        }
        (Type::Bitfield(f), Type::Bitfield(t)) => f.name == t.name || f.width <= t.width,
        (Type::Enum(f), Type::Enum(t)) => f.name == t.name,
        (Type::Struct(f), Type::Struct(t)) => f.name == t.name,
        (Type::Array { .. }, Type::Array { .. }) => from.same_shape(to),
        (Type::Tuple(fs), Type::Tuple(ts)) => {
            fs.len() == ts.len() && fs.iter().zip(ts).all(|(f, t)| assignable(f, t, symtab))
        }
        (Type::Boolean, Type::Boolean) | (Type::String, Type::String) | (Type::Void, Type::Void) => true,
        _ => false,
    }
}

fn bits_assignable(from: &BitsType, to: &BitsType, symtab: &SymbolTable) -> bool {
    from.is_unsized() || width_le(&from.width, &to.width, symtab)
}

/// `a <= b` for every XLEN the design can run at.
fn width_le(a: &Width, b: &Width, symtab: &SymbolTable) -> bool {
    match (a, b) {
        (Width::Fixed(a), Width::Fixed(b)) => a <= b,
        _ if a == b => true,
        _ => {
            let xlens = match symtab.xlen() {
                Some(xlen) => vec![xlen],
                None => symtab.possible_xlens(),
            };
            !xlens.is_empty()
                && xlens.into_iter().all(|xlen| {
                    match (a.evaluate("XLEN", xlen), b.evaluate("XLEN", xlen)) {
                        (Some(a), Some(b)) => a <= b,
                        _ => false,
                    }
                })
        }
    }
}
