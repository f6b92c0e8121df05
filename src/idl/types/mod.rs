//! The bit-precise IDL type system.
//!
//! Every checked expression carries one of these types. Bit vector widths are either fixed or
//! symbolic in an architecture parameter (`XLEN`, `XLEN-1`, ...) so that a fragment can be
//! checked once for a multi-XLEN configuration and once per concrete XLEN.

pub mod bitfield;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

pub use bitfield::{BitRange, BitfieldDef, BitfieldError, BitfieldField, mask_for_width};

bitflags! {
    /// Qualifiers attached to bit vector types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u8 {
        /// Binding cannot be assigned.
        const CONST = 0x01;
        /// Two's complement interpretation.
        const SIGNED = 0x02;
        /// Arbitrary-precision compile-time constant; adopts the width of the other operand.
        const UNSIZED = 0x04;
    }
}

/// Width of a bit vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Width {
    Fixed(u32),
    /// `name + offset`, where `name` is an architecture parameter whose value is not pinned.
    Param { name: Arc<str>, offset: i64 },
}

impl Width {
    pub fn param(name: impl Into<Arc<str>>) -> Self {
        Width::Param {
            name: name.into(),
            offset: 0,
        }
    }

    pub fn fixed(&self) -> Option<u32> {
        match self {
            Width::Fixed(width) => Some(*width),
            Width::Param { .. } => None,
        }
    }

    /// Adds a constant, keeping the result symbolic when `self` is.
    pub fn offset_by(&self, delta: i64) -> Option<Width> {
        match self {
            Width::Fixed(width) => {
                let result = i64::from(*width).checked_add(delta)?;
                u32::try_from(result).ok().map(Width::Fixed)
            }
            Width::Param { name, offset } => Some(Width::Param {
                name: name.clone(),
                offset: offset.checked_add(delta)?,
            }),
        }
    }

    /// Sum of two widths; `None` when both are symbolic.
    pub fn add(&self, other: &Width) -> Option<Width> {
        match (self, other) {
            (Width::Fixed(lhs), rhs) => rhs.offset_by(i64::from(*lhs)),
            (lhs, Width::Fixed(rhs)) => lhs.offset_by(i64::from(*rhs)),
            _ => None,
        }
    }

    /// Difference `self - other`; symbolic terms must cancel or `other` must be fixed.
    pub fn sub(&self, other: &Width) -> Option<Width> {
        match (self, other) {
            (lhs, Width::Fixed(rhs)) => lhs.offset_by(-i64::from(*rhs)),
            (
                Width::Param { name: lname, offset: loff },
                Width::Param { name: rname, offset: roff },
            ) if lname == rname => u32::try_from(loff.checked_sub(*roff)?).ok().map(Width::Fixed),
            _ => None,
        }
    }

    /// Substitutes a parameter value, producing a fixed width where possible.
    pub fn resolve(&self, name: &str, value: u32) -> Width {
        match self {
            Width::Param { name: pname, offset } if pname.as_ref() == name => {
                i64::from(value)
                    .checked_add(*offset)
                    .and_then(|resolved| u32::try_from(resolved).ok())
                    .map_or_else(|| self.clone(), Width::Fixed)
            }
            _ => self.clone(),
        }
    }

    /// Concrete width for a given parameter value.
    pub fn evaluate(&self, name: &str, value: u32) -> Option<u32> {
        self.resolve(name, value).fixed()
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Fixed(width) => write!(f, "{width}"),
            Width::Param { name, offset } if *offset == 0 => write!(f, "{name}"),
            Width::Param { name, offset } if *offset > 0 => write!(f, "{name}+{offset}"),
            Width::Param { name, offset } => write!(f, "{name}{offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitsType {
    pub width: Width,
    pub qualifiers: Qualifiers,
}

impl BitsType {
    pub fn new(width: Width) -> Self {
        Self {
            width,
            qualifiers: Qualifiers::empty(),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.qualifiers.contains(Qualifiers::SIGNED)
    }

    pub fn is_unsized(&self) -> bool {
        self.qualifiers.contains(Qualifiers::UNSIZED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumMember {
    pub name: Arc<str>,
    pub value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: Arc<str>,
    pub members: SmallVec<[EnumMember; 8]>,
}

impl EnumDef {
    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|member| member.name.as_ref() == name)
    }

    /// Bits needed to hold the largest member value.
    pub fn element_width(&self) -> u32 {
        let max = self.members.iter().map(|m| m.value).max().unwrap_or(0);
        bit_length(max).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: Arc<str>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: Arc<str>,
    pub fields: Vec<StructField>,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name.as_ref() == name)
    }
}

/// Core type representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bits(BitsType),
    Boolean,
    String,
    Enum(Arc<EnumDef>),
    Struct(Arc<StructDef>),
    Bitfield(Arc<BitfieldDef>),
    Array { element: Box<Type>, size: u32 },
    /// Values returned together by a multi-return function.
    Tuple(Vec<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
    /// The register denoted by `CSR[name]`.
    Csr(Arc<str>),
    Void,
}

impl Type {
    pub fn bits(width: u32) -> Type {
        Type::Bits(BitsType::new(Width::Fixed(width)))
    }

    pub fn bits_of(width: Width) -> Type {
        Type::Bits(BitsType::new(width))
    }

    pub fn unsized_const(width: u32) -> Type {
        Type::Bits(BitsType {
            width: Width::Fixed(width.max(1)),
            qualifiers: Qualifiers::UNSIZED | Qualifiers::CONST,
        })
    }

    pub fn as_bits(&self) -> Option<&BitsType> {
        match self {
            Type::Bits(bits) => Some(bits),
            _ => None,
        }
    }

    /// Width of any type that has a bit vector representation.
    pub fn bit_width(&self) -> Option<Width> {
        match self {
            Type::Bits(bits) => Some(bits.width.clone()),
            Type::Boolean => Some(Width::Fixed(1)),
            Type::Enum(def) => Some(Width::Fixed(def.element_width())),
            Type::Bitfield(def) => Some(Width::Fixed(def.width)),
            _ => None,
        }
    }

    pub fn is_unsized(&self) -> bool {
        self.as_bits().is_some_and(BitsType::is_unsized)
    }

    pub fn is_const(&self) -> bool {
        self.as_bits()
            .is_some_and(|bits| bits.qualifiers.contains(Qualifiers::CONST))
    }

    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Type {
        if let Type::Bits(bits) = &mut self {
            bits.qualifiers |= qualifiers;
        }
        self
    }

    pub fn without_qualifiers(mut self, qualifiers: Qualifiers) -> Type {
        if let Type::Bits(bits) = &mut self {
            bits.qualifiers.remove(qualifiers);
        }
        self
    }

    /// Structural equality ignoring qualifiers.
    pub fn same_shape(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Bits(lhs), Type::Bits(rhs)) => lhs.width == rhs.width,
            (Type::Array { element: le, size: ls }, Type::Array { element: re, size: rs }) => {
                ls == rs && le.same_shape(re)
            }
            (Type::Tuple(lhs), Type::Tuple(rhs)) => {
                lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(l, r)| l.same_shape(r))
            }
            (Type::Enum(lhs), Type::Enum(rhs)) => lhs.name == rhs.name,
            (Type::Struct(lhs), Type::Struct(rhs)) => lhs.name == rhs.name,
            (Type::Bitfield(lhs), Type::Bitfield(rhs)) => lhs.name == rhs.name,
            _ => self == other,
        }
    }

    /// Replaces symbolic widths that mention `name`.
    pub fn resolve_param(&self, name: &str, value: u32) -> Type {
        match self {
            Type::Bits(bits) => Type::Bits(BitsType {
                width: bits.width.resolve(name, value),
                qualifiers: bits.qualifiers,
            }),
            Type::Array { element, size } => Type::Array {
                element: Box::new(element.resolve_param(name, value)),
                size: *size,
            },
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| t.resolve_param(name, value)).collect())
            }
            Type::Function { params, ret } => Type::Function {
                params: params.iter().map(|t| t.resolve_param(name, value)).collect(),
                ret: Box::new(ret.resolve_param(name, value)),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bits(bits) => {
                if bits.is_unsized() {
                    return write!(f, "constant integer");
                }
                if bits.is_signed() {
                    write!(f, "signed ")?;
                }
                write!(f, "Bits<{}>", bits.width)
            }
            Type::Boolean => f.write_str("Boolean"),
            Type::String => f.write_str("String"),
            Type::Enum(def) => write!(f, "{}", def.name),
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::Bitfield(def) => write!(f, "{}", def.name),
            Type::Array { element, size } => write!(f, "{element}[{size}]"),
            Type::Tuple(items) => {
                f.write_str("(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Type::Function { params, ret } => {
                f.write_str("function(")?;
                for (idx, param) in params.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Csr(name) => write!(f, "CSR[{name}]"),
            Type::Void => f.write_str("void"),
        }
    }
}

/// Widest bit vector that constant folding represents exactly.
pub const MAX_FOLD_WIDTH: u32 = 128;

/// Number of significant bits in `value` (zero for zero).
pub fn bit_length(value: u128) -> u32 {
    128 - value.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_width_arithmetic_tracks_offsets() {
        let xlen = Width::param("XLEN");
        let hi = xlen.offset_by(-1).expect("offset");
        assert_eq!(hi.to_string(), "XLEN-1");
        let width = hi.sub(&Width::Fixed(0)).and_then(|w| w.offset_by(1)).expect("width");
        assert_eq!(width, xlen);
        assert_eq!(xlen.sub(&hi), Some(Width::Fixed(1)));
        assert_eq!(xlen.add(&xlen), None, "two symbolic terms cannot be summed");
    }

    #[test]
    fn width_arithmetic_overflow_is_not_a_width() {
        assert_eq!(Width::Fixed(8).offset_by(i64::MAX), None);
        assert_eq!(Width::param("XLEN").offset_by(i64::MAX).and_then(|w| w.offset_by(1)), None);
        let low = Width::Param {
            name: Arc::from("XLEN"),
            offset: i64::MIN,
        };
        assert_eq!(Width::param("XLEN").sub(&low.offset_by(1).expect("offset")), None);
        assert_eq!(low.resolve("XLEN", 32), low);
    }

    #[test]
    fn resolving_xlen_produces_fixed_widths() {
        let ty = Type::bits_of(Width::Param {
            name: Arc::from("XLEN"),
            offset: 8,
        });
        assert_eq!(ty.resolve_param("XLEN", 32), Type::bits(40));
        assert_eq!(ty.resolve_param("MXLEN", 32), ty, "unrelated parameters are untouched");
    }

    #[test]
    fn shape_comparison_ignores_qualifiers() {
        let signed = Type::bits(8).with_qualifiers(Qualifiers::SIGNED);
        assert!(signed.same_shape(&Type::bits(8)));
        assert!(!signed.same_shape(&Type::bits(16)));
        assert_eq!(signed.to_string(), "signed Bits<8>");
    }
}
