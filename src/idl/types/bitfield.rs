//! Bitfield metadata shared by user-declared `bitfield` types, CSR views and decode variables.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// Largest container the constant evaluator can model.
pub const MAX_BITFIELD_BITS: u32 = 128;

pub fn mask_for_width(width: u32) -> u128 {
    if width == 0 {
        0
    } else if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Inclusive `[msb:lsb]` range inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitRange {
    pub msb: u32,
    pub lsb: u32,
}

impl BitRange {
    pub fn new(msb: u32, lsb: u32) -> Result<Self, BitfieldError> {
        if msb < lsb {
            return Err(BitfieldError::ReversedRange { msb, lsb });
        }
        if msb >= MAX_BITFIELD_BITS {
            return Err(BitfieldError::OutOfRange { msb });
        }
        Ok(Self { msb, lsb })
    }

    pub fn single(bit: u32) -> Self {
        Self { msb: bit, lsb: bit }
    }

    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }

    pub fn mask(&self) -> u128 {
        mask_for_width(self.width()) << self.lsb
    }

    pub fn extract(&self, container: u128) -> u128 {
        (container >> self.lsb) & mask_for_width(self.width())
    }

    pub fn insert(&self, container: u128, value: u128) -> u128 {
        (container & !self.mask()) | ((value << self.lsb) & self.mask())
    }

    /// Parses `"msb-lsb"` or a single bit index, the notation used for CSR field locations.
    pub fn parse(text: &str) -> Result<Self, BitfieldError> {
        let text = text.trim();
        match text.split_once('-') {
            Some((hi, lo)) => BitRange::new(parse_bit(hi)?, parse_bit(lo)?),
            None => {
                let bit = parse_bit(text)?;
                BitRange::new(bit, bit)
            }
        }
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.msb == self.lsb {
            write!(f, "{}", self.msb)
        } else {
            write!(f, "{}-{}", self.msb, self.lsb)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitfieldField {
    pub name: Arc<str>,
    pub range: BitRange,
}

/// A named container whose fields alias bit ranges of the whole.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitfieldDef {
    pub name: Arc<str>,
    pub width: u32,
    pub fields: SmallVec<[BitfieldField; 8]>,
}

impl BitfieldDef {
    pub fn builder(name: impl Into<Arc<str>>, width: u32) -> BitfieldBuilder {
        BitfieldBuilder::new(name.into(), width)
    }

    pub fn field(&self, name: &str) -> Option<&BitfieldField> {
        self.fields.iter().find(|field| field.name.as_ref() == name)
    }
}

pub struct BitfieldBuilder {
    def: BitfieldDef,
}

impl BitfieldBuilder {
    fn new(name: Arc<str>, width: u32) -> Self {
        Self {
            def: BitfieldDef {
                name,
                width,
                fields: SmallVec::new(),
            },
        }
    }

    pub fn field(mut self, name: impl Into<Arc<str>>, range: BitRange) -> Result<Self, BitfieldError> {
        let name = name.into();
        if range.msb >= self.def.width {
            return Err(BitfieldError::FieldExceedsContainer {
                field: name.to_string(),
                msb: range.msb,
                width: self.def.width,
            });
        }
        if self.def.field(&name).is_some() {
            return Err(BitfieldError::DuplicateField(name.to_string()));
        }
        if let Some(other) = self
            .def
            .fields
            .iter()
            .find(|other| other.range.mask() & range.mask() != 0)
        {
            return Err(BitfieldError::Overlap {
                field: name.to_string(),
                other: other.name.to_string(),
            });
        }
        self.def.fields.push(BitfieldField { name, range });
        Ok(self)
    }

    pub fn finish(self) -> BitfieldDef {
        self.def
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitfieldError {
    ReversedRange { msb: u32, lsb: u32 },
    OutOfRange { msb: u32 },
    InvalidNumber(String),
    FieldExceedsContainer { field: String, msb: u32, width: u32 },
    DuplicateField(String),
    Overlap { field: String, other: String },
}

impl fmt::Display for BitfieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitfieldError::ReversedRange { msb, lsb } => {
                write!(f, "bit range {msb}-{lsb} has msb below lsb")
            }
            BitfieldError::OutOfRange { msb } => {
                write!(f, "bit {msb} exceeds the {MAX_BITFIELD_BITS}-bit limit")
            }
            BitfieldError::InvalidNumber(text) => write!(f, "invalid bit index '{text}'"),
            BitfieldError::FieldExceedsContainer { field, msb, width } => {
                write!(f, "field '{field}' reaches bit {msb} of a {width}-bit container")
            }
            BitfieldError::DuplicateField(field) => write!(f, "duplicate field '{field}'"),
            BitfieldError::Overlap { field, other } => {
                write!(f, "field '{field}' overlaps '{other}'")
            }
        }
    }
}

impl std::error::Error for BitfieldError {}

fn parse_bit(text: &str) -> Result<u32, BitfieldError> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| BitfieldError::InvalidNumber(text.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_extracts_and_inserts() {
        let range = BitRange::parse("12-11").expect("range");
        assert_eq!(range.width(), 2);
        assert_eq!(range.mask(), 0x1800);
        assert_eq!(range.extract(0x1800), 0b11);
        assert_eq!(range.insert(0xffff, 0), 0xe7ff);
    }

    #[test]
    fn builder_rejects_overlapping_fields() {
        let err = BitfieldDef::builder("Status", 8)
            .field("A", BitRange::new(3, 0).expect("range"))
            .and_then(|b| b.field("B", BitRange::new(4, 3).expect("range")))
            .err()
            .expect("overlap should be rejected");
        assert_eq!(
            err,
            BitfieldError::Overlap {
                field: "B".into(),
                other: "A".into()
            }
        );
    }

    #[test]
    fn builder_rejects_fields_past_container() {
        let result = BitfieldDef::builder("Small", 4).field("HI", BitRange::single(4));
        assert!(matches!(
            result.err(),
            Some(BitfieldError::FieldExceedsContainer { msb: 4, width: 4, .. })
        ));
    }
}
