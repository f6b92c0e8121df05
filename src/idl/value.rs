//! Compile-time constant values produced by folding.

use std::fmt;
use std::sync::Arc;

use crate::idl::types::{EnumDef, mask_for_width};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitsValue {
    /// Raw two's complement payload, masked to `width` when sized.
    pub value: u128,
    /// `None` for unsized (arbitrary precision) constants.
    pub width: Option<u32>,
    pub signed: bool,
}

impl BitsValue {
    pub fn sized(value: u128, width: u32) -> Self {
        Self {
            value: value & mask_for_width(width),
            width: Some(width),
            signed: false,
        }
    }

    pub fn unsized_value(value: u128) -> Self {
        Self {
            value,
            width: None,
            signed: false,
        }
    }

    pub fn signed_unsized(value: i128) -> Self {
        Self {
            value: value as u128,
            width: None,
            signed: value < 0,
        }
    }

    pub fn with_width(&self, width: Option<u32>) -> Self {
        match width {
            Some(width) => Self {
                value: self.value & mask_for_width(width),
                width: Some(width),
                signed: self.signed,
            },
            None => self.clone(),
        }
    }

    /// Signed interpretation of the payload.
    pub fn as_i128(&self) -> i128 {
        match self.width {
            Some(width) if width < 128 && self.signed => {
                let shift = 128 - width;
                ((self.value << shift) as i128) >> shift
            }
            _ => self.value as i128,
        }
    }

    /// Value as an unsigned index when it fits.
    pub fn as_u32(&self) -> Option<u32> {
        if self.signed && self.as_i128() < 0 {
            return None;
        }
        u32::try_from(self.value).ok()
    }

    pub fn is_zero(&self) -> bool {
        self.value & self.width.map(mask_for_width).unwrap_or(u128::MAX) == 0
    }

    /// Minimum number of bits needed to represent this value.
    pub fn required_width(&self) -> u32 {
        if self.signed && self.as_i128() < 0 {
            let magnitude = (!self.as_i128()) as u128;
            crate::idl::types::bit_length(magnitude) + 1
        } else {
            crate::idl::types::bit_length(self.value).max(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: Arc<EnumDef>,
    pub member: Arc<str>,
    pub value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bits(BitsValue),
    Bool(bool),
    String(Arc<str>),
    Enum(EnumValue),
}

impl Value {
    pub fn unsized_int(value: u128) -> Value {
        Value::Bits(BitsValue::unsized_value(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitsValue> {
        match self {
            Value::Bits(bits) => Some(bits),
            _ => None,
        }
    }

    /// Integer view used by index and width computations.
    pub fn as_integer(&self) -> Option<u128> {
        match self {
            Value::Bits(bits) => Some(bits.value),
            Value::Enum(member) => Some(member.value),
            Value::Bool(flag) => Some(u128::from(*flag)),
            Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(bits) => match bits.width {
                Some(width) => write!(f, "{width}'d{}", bits.value),
                None if bits.signed && bits.as_i128() < 0 => write!(f, "{}", bits.as_i128()),
                None => write!(f, "{}", bits.value),
            },
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::String(text) => write!(f, "\"{text}\""),
            Value::Enum(member) => write!(f, "{}::{}", member.ty.name, member.member),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_values_are_masked() {
        let value = BitsValue::sized(0x1ff, 8);
        assert_eq!(value.value, 0xff);
        assert_eq!(Value::Bits(value).to_string(), "8'd255");
    }

    #[test]
    fn signed_interpretation_sign_extends() {
        let mut value = BitsValue::sized(0x80, 8);
        value.signed = true;
        assert_eq!(value.as_i128(), -128);
        assert_eq!(value.required_width(), 8);
        assert_eq!(Value::Bits(BitsValue::signed_unsized(-3)).to_string(), "-3");
    }
}
