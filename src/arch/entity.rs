//! Configuration-independent architecture records and the IDL fragments they carry.

use std::path::Path;
use std::sync::Arc;

use semver::Version;

use crate::idl::types::{BitRange, BitfieldDef, BitfieldError};
use crate::loader::idl::SourceOrigin;

/// An IDL fragment embedded in an architecture record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdlSource {
    pub text: String,
    pub path: Arc<Path>,
    /// Line of the enclosing file on which `text` starts.
    pub line: usize,
}

impl IdlSource {
    pub fn new(text: impl Into<String>, path: impl AsRef<Path>, line: usize) -> Self {
        Self {
            text: text.into(),
            path: Arc::from(path.as_ref()),
            line,
        }
    }

    pub fn origin(&self) -> SourceOrigin {
        SourceOrigin {
            path: self.path.clone(),
            line: self.line,
            column: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsrLength {
    Fixed(u32),
    /// Tracks the effective XLEN of the mode that owns the register.
    Xlen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLocation {
    Fixed(BitRange),
    PerXlen { rv32: BitRange, rv64: BitRange },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldAccess {
    ReadOnly,
    ReadWrite,
    /// Read-only, but hardware may update the value.
    ReadOnlyHardware,
    /// Writable with a restricted set of legal values.
    ReadWriteRestricted,
    /// Writable, and hardware may update the value.
    ReadWriteHardware,
}

impl FieldAccess {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "RO" => Some(FieldAccess::ReadOnly),
            "RW" => Some(FieldAccess::ReadWrite),
            "RO-H" => Some(FieldAccess::ReadOnlyHardware),
            "RW-R" => Some(FieldAccess::ReadWriteRestricted),
            "RW-H" | "RW-RH" => Some(FieldAccess::ReadWriteHardware),
            _ => None,
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            FieldAccess::ReadWrite | FieldAccess::ReadWriteRestricted | FieldAccess::ReadWriteHardware
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsrField {
    pub name: String,
    pub location: FieldLocation,
    pub access: FieldAccess,
    /// Body of `sw_write(csr_value)`.
    pub sw_write: Option<IdlSource>,
}

impl CsrField {
    pub fn location_for(&self, xlen: u32) -> BitRange {
        match self.location {
            FieldLocation::Fixed(range) => range,
            FieldLocation::PerXlen { rv32, rv64 } => {
                if xlen == 32 {
                    rv32
                } else {
                    rv64
                }
            }
        }
    }

    pub fn width_for(&self, xlen: u32) -> u32 {
        self.location_for(xlen).width()
    }

    pub fn is_xlen_dependent(&self) -> bool {
        matches!(self.location, FieldLocation::PerXlen { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Csr {
    pub name: String,
    pub address: Option<u32>,
    pub length: CsrLength,
    pub defined_by: String,
    pub fields: Vec<CsrField>,
    /// Body of `sw_read()`, for registers whose value is computed.
    pub sw_read: Option<IdlSource>,
}

impl Csr {
    pub fn field(&self, name: &str) -> Option<&CsrField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn length_for(&self, xlen: u32) -> u32 {
        match self.length {
            CsrLength::Fixed(width) => width,
            CsrLength::Xlen => xlen,
        }
    }

    /// Bitfield view of the register at a given XLEN, used to type `csr_value`.
    pub fn bitfield(&self, xlen: u32) -> Result<BitfieldDef, BitfieldError> {
        let mut builder = BitfieldDef::builder(format!("Csr{}", self.name), self.length_for(xlen));
        for field in &self.fields {
            builder = builder.field(field.name.as_str(), field.location_for(xlen))?;
        }
        Ok(builder.finish())
    }
}

/// A decode field of an instruction encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodeVariable {
    pub name: String,
    /// Encoding bit ranges, most significant segment first.
    pub segments: Vec<BitRange>,
    /// Implicit low zero bits appended after the segments.
    pub left_shift: u32,
    pub sign_extend: bool,
}

impl DecodeVariable {
    pub fn width(&self) -> u32 {
        self.segments.iter().map(BitRange::width).sum::<u32>() + self.left_shift
    }

    /// Extracts the field value from an encoding.
    pub fn extract(&self, encoding: u128) -> u128 {
        let mut value = 0u128;
        for segment in &self.segments {
            value = (value << segment.width()) | segment.extract(encoding);
        }
        value << self.left_shift
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub name: String,
    pub defined_by: String,
    pub encoding_width: u32,
    pub decode_variables: Vec<DecodeVariable>,
    /// Body of `operation()`.
    pub operation: Option<IdlSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionVersion {
    pub version: Version,
    pub ratified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension {
    pub name: String,
    pub versions: Vec<ExtensionVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Integer,
    Boolean,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_variable_concatenates_segments() {
        // B-type immediate: imm[12|10:5] from 31|30-25, imm[4:1|11] from 11-8|7
        let imm = DecodeVariable {
            name: "imm".into(),
            segments: vec![
                BitRange::single(31),
                BitRange::single(7),
                BitRange::new(30, 25).expect("range"),
                BitRange::new(11, 8).expect("range"),
            ],
            left_shift: 1,
            sign_extend: true,
        };
        assert_eq!(imm.width(), 13);
        // beq x0, x0, -2 => all immediate bits set
        assert_eq!(imm.extract(0xfe00_0fe3), 0x1ffe);
    }

    #[test]
    fn csr_bitfield_follows_xlen() {
        let csr = Csr {
            name: "misa".into(),
            address: Some(0x301),
            length: CsrLength::Xlen,
            defined_by: "Sm".into(),
            fields: vec![
                CsrField {
                    name: "MXL".into(),
                    location: FieldLocation::PerXlen {
                        rv32: BitRange::new(31, 30).expect("range"),
                        rv64: BitRange::new(63, 62).expect("range"),
                    },
                    access: FieldAccess::ReadOnly,
                    sw_write: None,
                },
                CsrField {
                    name: "A".into(),
                    location: FieldLocation::Fixed(BitRange::single(0)),
                    access: FieldAccess::ReadWrite,
                    sw_write: None,
                },
            ],
            sw_read: None,
        };
        let rv32 = csr.bitfield(32).expect("rv32 view");
        assert_eq!(rv32.width, 32);
        assert_eq!(rv32.field("MXL").map(|f| f.range.msb), Some(31));
        let rv64 = csr.bitfield(64).expect("rv64 view");
        assert_eq!(rv64.field("MXL").map(|f| f.range.msb), Some(63));
    }
}
