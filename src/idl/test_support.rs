//! Fixtures shared by unit tests: a small RV-like architecture and configuration helpers.

use std::sync::Arc;

use semver::Version;

use crate::arch::config::{ConfigKind, ExtensionRequirement, ExtensionVersionRef};
use crate::arch::{
    Architecture, Configuration, Csr, CsrField, CsrLength, DecodeVariable, Extension, ExtensionVersion,
    FieldAccess, FieldLocation, IdlSource, Instruction, ParamKind, TrapCode, TrapKind,
};
use crate::idl::ast::{Expr, FunctionBody};
use crate::idl::symbols::SymbolTable;
use crate::idl::types::BitRange;
use crate::idl::value::Value;
use crate::loader::idl::{SourceOrigin, parse_expression, parse_function_body};

const GLOBALS: &str = r#"
function foo {
  returns Bits<8>
  arguments Bits<8> value
  description {
    Increments through bar.
  }
  body {
    return bar(value);
  }
}

function bar {
  returns Bits<8>
  arguments Bits<8> value
  description {
    Increments.
  }
  body {
    return value + 1;
  }
}

function access_fault {
  arguments ExceptionCode code, XReg tval
  description {
    Raises code with tval.
  }
  body {
    raise(code, mode(), tval);
  }
}

function ones {
  template U32 N
  returns Bits<N>
  description {
    All ones.
  }
  body {
    Bits<N> zero = 0;
    return ~zero;
  }
}
"#;

fn range(msb: u32, lsb: u32) -> BitRange {
    BitRange::new(msb, lsb).expect("valid range")
}

fn source(text: &str) -> Option<IdlSource> {
    Some(IdlSource::new(text, "mini.toml", 1))
}

fn extension(name: &str, major: u64, minor: u64) -> Extension {
    Extension {
        name: name.into(),
        versions: vec![ExtensionVersion {
            version: Version::new(major, minor, 0),
            ratified: true,
        }],
    }
}

fn itype(name: &str, defined_by: &str, operation: &str) -> Instruction {
    Instruction {
        name: name.into(),
        defined_by: defined_by.into(),
        encoding_width: 32,
        decode_variables: vec![
            DecodeVariable {
                name: "imm".into(),
                segments: vec![range(31, 20)],
                left_shift: 0,
                sign_extend: true,
            },
            DecodeVariable {
                name: "rs1".into(),
                segments: vec![range(19, 15)],
                left_shift: 0,
                sign_extend: false,
            },
            DecodeVariable {
                name: "rd".into(),
                segments: vec![range(11, 7)],
                left_shift: 0,
                sign_extend: false,
            },
        ],
        operation: source(operation),
    }
}

fn rtype(name: &str, defined_by: &str, operation: &str) -> Instruction {
    let reg = |name: &str, msb, lsb| DecodeVariable {
        name: name.into(),
        segments: vec![range(msb, lsb)],
        left_shift: 0,
        sign_extend: false,
    };
    Instruction {
        name: name.into(),
        defined_by: defined_by.into(),
        encoding_width: 32,
        decode_variables: vec![reg("rs2", 24, 20), reg("rs1", 19, 15), reg("rd", 11, 7)],
        operation: source(operation),
    }
}

fn field(name: &str, location: FieldLocation, access: FieldAccess, sw_write: Option<&str>) -> CsrField {
    CsrField {
        name: name.into(),
        location,
        access,
        sw_write: sw_write.and_then(source),
    }
}

/// Extensions I, M, Q and Sm; a handful of CSRs, instructions and trap codes.
pub fn mini_arch() -> Architecture {
    let traps = [
        (TrapKind::Exception, "Instruction address misaligned", "InstructionAddressMisaligned", 0),
        (TrapKind::Exception, "Illegal instruction", "IllegalInstruction", 2),
        (TrapKind::Exception, "Breakpoint", "Breakpoint", 3),
        (TrapKind::Exception, "Load address misaligned", "LoadAddressMisaligned", 4),
        (TrapKind::Exception, "Load access fault", "LoadAccessFault", 5),
        (TrapKind::Exception, "Environment call from M-mode", "Mcall", 11),
        (TrapKind::Interrupt, "Machine software interrupt", "MachineSoftware", 3),
        (TrapKind::Interrupt, "Machine timer interrupt", "MachineTimer", 7),
    ];
    let mut builder = Architecture::builder("mini")
        .param("MXLEN", ParamKind::Integer)
        .param("MISALIGNED_LDST", ParamKind::Boolean)
        .extension(extension("I", 2, 1))
        .extension(extension("M", 2, 0))
        .extension(extension("Q", 2, 2))
        .extension(extension("Sm", 1, 12))
        .csr(Csr {
            name: "mscratch".into(),
            address: Some(0x340),
            length: CsrLength::Xlen,
            defined_by: "Sm".into(),
            fields: vec![field(
                "VALUE",
                FieldLocation::PerXlen {
                    rv32: range(31, 0),
                    rv64: range(63, 0),
                },
                FieldAccess::ReadWrite,
                Some("return csr_value.VALUE;"),
            )],
            sw_read: None,
        })
        .csr(Csr {
            name: "misa".into(),
            address: Some(0x301),
            length: CsrLength::Xlen,
            defined_by: "Sm".into(),
            fields: vec![
                field(
                    "MXL",
                    FieldLocation::PerXlen {
                        rv32: range(31, 30),
                        rv64: range(63, 62),
                    },
                    FieldAccess::ReadOnly,
                    None,
                ),
                field("EXTS", FieldLocation::Fixed(range(25, 0)), FieldAccess::ReadOnly, None),
            ],
            sw_read: None,
        })
        .csr(Csr {
            name: "mskew".into(),
            address: Some(0x7c0),
            length: CsrLength::Fixed(64),
            defined_by: "Sm".into(),
            fields: vec![field(
                "ODD",
                FieldLocation::PerXlen {
                    rv32: range(3, 0),
                    rv64: range(7, 0),
                },
                FieldAccess::ReadWrite,
                None,
            )],
            sw_read: None,
        })
        .csr(Csr {
            name: "mcount".into(),
            address: Some(0xb00),
            length: CsrLength::Fixed(64),
            defined_by: "Sm".into(),
            fields: vec![field("COUNT", FieldLocation::Fixed(range(63, 0)), FieldAccess::ReadOnly, None)],
            sw_read: source("return {56'd0, foo(8'd1)};"),
        })
        .csr(Csr {
            name: "qstate".into(),
            address: Some(0x800),
            length: CsrLength::Fixed(32),
            defined_by: "Q".into(),
            fields: vec![field("ROUND", FieldLocation::Fixed(range(2, 0)), FieldAccess::ReadWrite, None)],
            sw_read: None,
        })
        .instruction(itype(
            "addi",
            "I",
            "XReg imm_ext = {{XLEN-12{imm[11]}}, imm};\nX[rd] = X[rs1] + imm_ext;",
        ))
        .instruction(itype(
            "lw",
            "I",
            "XReg virtual_address = X[rs1] + {{XLEN-12{imm[11]}}, imm};\n\
             if (virtual_address[1:0] != 0) {\n  raise(ExceptionCode::LoadAddressMisaligned, mode(), virtual_address);\n}\n\
             X[rd] = read_memory<32>(virtual_address);",
        ))
        .instruction(rtype("add", "I", "X[rd] = X[rs1] + X[rs2];"))
        .instruction(rtype("mul", "M", "X[rd] = X[rs1] * X[rs2];"))
        .global(IdlSource::new(GLOBALS, "mini_globals.idl", 1));
    for (kind, name, var, num) in traps {
        let defined_by = if kind == TrapKind::Interrupt { "Sm" } else { "I" };
        builder = builder.trap(TrapCode::new(kind, name, var, num, defined_by));
    }
    builder.build().expect("mini architecture")
}

/// Unconfigured design with integer parameters pinned.
pub fn configuration(name: &str, params: &[(&str, u64)]) -> Configuration {
    let mut config = Configuration::unconfigured(name);
    for (param, value) in params {
        config
            .params
            .insert((*param).to_string(), Value::unsized_int(u128::from(*value)));
    }
    config
}

/// Fully configured design implementing exactly `extensions`.
pub fn full_config(extensions: &[&str], xlen: u64) -> Configuration {
    let arch = mini_arch();
    let mut config = configuration("full", &[("MXLEN", xlen)]);
    config.kind = ConfigKind::FullyConfigured;
    config.params.insert("MISALIGNED_LDST".into(), Value::Bool(false));
    config.implemented = extensions
        .iter()
        .map(|name| ExtensionVersionRef {
            name: (*name).to_string(),
            version: arch
                .extension(name)
                .and_then(|ext| ext.versions.first())
                .map(|v| v.version.clone())
                .unwrap_or_else(|| Version::new(1, 0, 0)),
        })
        .collect();
    config
}

/// Partially configured design.
pub fn partial_config(mandatory: &[&str], prohibited: &[&str], xlen: u64) -> Configuration {
    let requirement = |name: &&str| ExtensionRequirement {
        name: (*name).to_string(),
        requirement: None,
    };
    let mut config = configuration("partial", &[("MXLEN", xlen)]);
    config.kind = ConfigKind::PartiallyConfigured;
    config.mandatory = mandatory.iter().map(requirement).collect();
    config.prohibited = prohibited.iter().map(requirement).collect();
    config
}

fn global_scope(config: Configuration) -> SymbolTable {
    SymbolTable::for_architecture(Arc::new(mini_arch()), Arc::new(config)).expect("global scope")
}

pub fn symtab_full(extensions: &[&str], xlen: u64) -> SymbolTable {
    global_scope(full_config(extensions, xlen))
}

pub fn symtab_partial(mandatory: &[&str], prohibited: &[&str], xlen: u64) -> SymbolTable {
    global_scope(partial_config(mandatory, prohibited, xlen))
}

/// Generic architecture: nothing pinned, XLEN may be 32 or 64.
pub fn symtab_generic() -> SymbolTable {
    global_scope(Configuration::unconfigured("generic"))
}

pub fn expr(text: &str) -> Expr {
    parse_expression(text, &SourceOrigin::inline("<test>")).expect("expression parses")
}

pub fn body(text: &str) -> FunctionBody {
    parse_function_body(text, &SourceOrigin::inline("<test>")).expect("body parses")
}

/// Panics unless every statement and expression carries a type.
pub fn assert_fully_typed(body: &FunctionBody) {
    for stmt in &body.statements {
        assert!(stmt.ty.is_some(), "untyped statement at {}", stmt.span);
        stmt.walk_exprs(&mut |expr| {
            assert!(expr.ty.is_some(), "untyped expression `{expr}` at {}", expr.span);
        });
    }
}
