//! Construction of the frozen global scope for an architecture and configuration.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::arch::{Architecture, Configuration, ParamKind, TrapKind};
use crate::idl::ast::{BitfieldDecl, EnumDecl, Expr, IdlFile, Item, StructDecl};
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::eval;
use crate::idl::typeck;
use crate::idl::types::{
    BitRange, BitfieldDef, EnumDef, EnumMember, Qualifiers, StructDef, StructField, Type, Width,
};
use crate::idl::value::Value;
use crate::loader::idl::{SourceOrigin, parse_declarations};

use super::symbol::{Symbol, VarOrigin, Variable};
use super::table::SymbolTable;

const PRELUDE: &str = include_str!("prelude.idl");

/// Number of registers in the `X` register file.
pub const XREG_COUNT: u32 = 32;

impl SymbolTable {
    /// Builds and freezes the global scope for `arch` under `config`.
    pub fn for_architecture(
        arch: Arc<Architecture>,
        config: Arc<Configuration>,
    ) -> IdlResult<SymbolTable> {
        let mut builder = GlobalScopeBuilder::new(SymbolTable::new(arch.clone(), config));
        builder.builtin_types()?;
        builder.params()?;
        builder.generated_enums()?;
        builder.register_file()?;

        let mut files = vec![parse_declarations(PRELUDE, &SourceOrigin::inline("<prelude>"))?];
        for source in &arch.globals {
            files.push(parse_declarations(&source.text, &source.origin())?);
        }
        builder.declarations(files)?;

        let mut table = builder.finish();
        debug!(
            arch = %arch.name,
            config = %table.config().name,
            xlen = ?table.xlen(),
            "global scope frozen"
        );
        table.deep_freeze();
        Ok(table)
    }
}

struct GlobalScopeBuilder {
    table: SymbolTable,
}

impl GlobalScopeBuilder {
    fn new(table: SymbolTable) -> Self {
        Self { table }
    }

    fn finish(self) -> SymbolTable {
        self.table
    }

    fn add(&mut self, name: &str, symbol: Symbol) -> IdlResult<()> {
        self.table.add(name, symbol).map_err(IdlError::from)
    }

    fn builtin_types(&mut self) -> IdlResult<()> {
        self.add("Boolean", Symbol::Type(Type::Boolean))?;
        self.add("String", Symbol::Type(Type::String))?;
        self.add("XReg", Symbol::Type(Type::bits_of(Width::param("XLEN"))))?;
        self.add("U32", Symbol::Type(Type::bits(32)))?;
        self.add("U64", Symbol::Type(Type::bits(64)))
    }

    fn params(&mut self) -> IdlResult<()> {
        let arch = self.table.arch().clone();
        let config = self.table.config().clone();
        for param in arch.params.values() {
            let value = config.param_value(&param.name).cloned();
            let var = match (param.kind, value) {
                (ParamKind::Integer, Some(Value::Bits(bits))) => {
                    let width = bits.required_width();
                    Variable::constant(Type::unsized_const(width), Value::Bits(bits), VarOrigin::ArchParam)
                }
                (ParamKind::Integer, _) => Variable::new(
                    Type::bits(64).with_qualifiers(Qualifiers::CONST),
                    VarOrigin::ArchParam,
                )
                .immutable(),
                (ParamKind::Boolean, value @ (Some(Value::Bool(_)) | None)) => {
                    Variable::new(Type::Boolean, VarOrigin::ArchParam)
                        .immutable()
                        .with_value(value)
                }
                (ParamKind::String, value @ (Some(Value::String(_)) | None)) => {
                    Variable::new(Type::String, VarOrigin::ArchParam)
                        .immutable()
                        .with_value(value)
                }
                (kind, Some(value)) => {
                    return Err(IdlError::Config(format!(
                        "parameter '{}' is declared {kind:?} but configured as {value}",
                        param.name
                    )));
                }
            };
            self.add(&param.name, Symbol::Variable(var))?;
        }
        Ok(())
    }

    fn generated_enums(&mut self) -> IdlResult<()> {
        let arch = self.table.arch().clone();
        let members: SmallVec<[EnumMember; 8]> = arch
            .extensions
            .keys()
            .enumerate()
            .map(|(idx, name)| EnumMember {
                name: Arc::from(name.as_str()),
                value: idx as u128,
            })
            .collect();
        let extensions = Type::Enum(Arc::new(EnumDef {
            name: Arc::from("ExtensionName"),
            members,
        }));
        self.add("ExtensionName", Symbol::Type(extensions.clone()))?;
        self.add("Extension", Symbol::Type(extensions))?;

        for table in [&arch.exceptions, &arch.interrupts] {
            let name = match table.kind() {
                TrapKind::Exception => "ExceptionCode",
                TrapKind::Interrupt => "InterruptCode",
            };
            self.add(name, Symbol::Type(Type::Enum(table.enum_def().clone())))?;
        }
        Ok(())
    }

    fn register_file(&mut self) -> IdlResult<()> {
        let ty = Type::Array {
            element: Box::new(Type::bits_of(Width::param("XLEN"))),
            size: XREG_COUNT,
        };
        self.add("X", Symbol::Variable(Variable::new(ty, VarOrigin::RegisterFile)))
    }

    /// Types first, then functions, then constants, so declarations may refer forward.
    fn declarations(&mut self, files: Vec<IdlFile>) -> IdlResult<()> {
        let mut functions = Vec::new();
        let mut constants = Vec::new();
        for item in files.into_iter().flat_map(|file| file.items) {
            match item {
                Item::Enum(decl) => {
                    let def = self.enum_def(&decl)?;
                    self.add(&decl.name, Symbol::Type(Type::Enum(Arc::new(def))))?;
                }
                Item::Bitfield(decl) => {
                    let def = self.bitfield_def(&decl)?;
                    self.add(&decl.name, Symbol::Type(Type::Bitfield(Arc::new(def))))?;
                }
                Item::Struct(decl) => {
                    let def = self.struct_def(&decl)?;
                    self.add(&decl.name, Symbol::Type(Type::Struct(Arc::new(def))))?;
                }
                Item::Function(decl) => functions.push(decl),
                Item::Constant(stmt) => constants.push(stmt),
            }
        }
        for decl in functions {
            let name = decl.name.clone();
            self.add(&name, Symbol::Function(Arc::new(decl)))?;
        }
        for mut stmt in constants {
            typeck::check_global_constant(&mut stmt, &mut self.table)?;
        }
        Ok(())
    }

    fn constant_u128(&self, expr: &Expr, what: &str) -> IdlResult<u128> {
        eval::evaluate(expr, &self.table)
            .and_then(|value| value.as_integer())
            .ok_or_else(|| {
                IdlError::type_error(
                    "typeck.non-constant",
                    format!("{what} must be a compile-time constant"),
                    &expr.span,
                )
            })
    }

    fn constant_u32(&self, expr: &Expr, what: &str) -> IdlResult<u32> {
        let value = self.constant_u128(expr, what)?;
        u32::try_from(value).map_err(|_| {
            IdlError::type_error("typeck.non-constant", format!("{what} is out of range"), &expr.span)
        })
    }

    fn enum_def(&self, decl: &EnumDecl) -> IdlResult<EnumDef> {
        let mut members: SmallVec<[EnumMember; 8]> = SmallVec::new();
        let mut next = 0u128;
        for member in &decl.members {
            let value = match &member.value {
                Some(expr) => self.constant_u128(expr, "enum member value")?,
                None => next,
            };
            if members.iter().any(|m| m.name.as_ref() == member.name) {
                return Err(IdlError::type_error(
                    "typeck.duplicate-member",
                    format!("enum '{}' declares '{}' twice", decl.name, member.name),
                    &decl.span,
                ));
            }
            members.push(EnumMember {
                name: Arc::from(member.name.as_str()),
                value,
            });
            next = value.wrapping_add(1);
        }
        Ok(EnumDef {
            name: Arc::from(decl.name.as_str()),
            members,
        })
    }

    fn bitfield_def(&self, decl: &BitfieldDecl) -> IdlResult<BitfieldDef> {
        let width = self.constant_u32(&decl.width, "bitfield width")?;
        let mut builder = BitfieldDef::builder(decl.name.as_str(), width);
        for field in &decl.fields {
            let msb = self.constant_u32(&field.msb, "bitfield position")?;
            let lsb = match &field.lsb {
                Some(lsb) => self.constant_u32(lsb, "bitfield position")?,
                None => msb,
            };
            let range = BitRange::new(msb, lsb).map_err(|err| {
                IdlError::type_error("typeck.bitfield", err.to_string(), &field.msb.span)
            })?;
            builder = builder
                .field(field.name.as_str(), range)
                .map_err(|err| IdlError::type_error("typeck.bitfield", err.to_string(), &decl.span))?;
        }
        Ok(builder.finish())
    }

    fn struct_def(&self, decl: &StructDecl) -> IdlResult<StructDef> {
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            fields.push(StructField {
                name: Arc::from(field.name.as_str()),
                ty: typeck::resolve_type_expr(&field.ty, &self.table)?,
            });
        }
        Ok(StructDef {
            name: Arc::from(decl.name.as_str()),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Extension, ExtensionVersion, IdlSource};
    use crate::idl::test_support::{configuration, mini_arch};

    #[test]
    fn global_scope_is_frozen_and_populated() {
        let table = SymbolTable::for_architecture(
            Arc::new(mini_arch()),
            Arc::new(configuration("rv64", &[("MXLEN", 64)])),
        )
        .expect("global scope");
        assert!(table.is_frozen());
        assert!(table.lookup_function("implemented?").is_some());
        assert!(table.lookup_function("raise").is_some_and(|decl| decl.builtin));
        assert_eq!(table.lookup_type("XReg"), Some(&Type::bits_of(Width::param("XLEN"))));
        match table.lookup_type("Extension") {
            Some(Type::Enum(def)) => assert!(def.member("Q").is_some()),
            other => panic!("Extension should alias the extension enum, got {other:?}"),
        }
        assert_eq!(table.param_value("MXLEN"), Some(Value::unsized_int(64)));
    }

    #[test]
    fn global_constants_are_evaluated() {
        let arch = Architecture::builder("consts")
            .extension(Extension {
                name: "I".into(),
                versions: vec![ExtensionVersion {
                    version: semver::Version::new(2, 1, 0),
                    ratified: true,
                }],
            })
            .global(IdlSource::new(
                "Bits<7> OP_IMM = 7'b0010011;\nbitfield (8) Flags { HI 7-4 LO 3-0 }\n",
                "globals.idl",
                1,
            ))
            .build()
            .expect("arch");
        let table = SymbolTable::for_architecture(Arc::new(arch), Arc::new(Configuration::unconfigured("g")))
            .expect("global scope");
        let op = table.lookup_var("OP_IMM").expect("constant");
        assert!(!op.mutable);
        assert_eq!(op.value.as_ref().and_then(Value::as_integer), Some(0b0010011));
        match table.lookup_type("Flags") {
            Some(Type::Bitfield(def)) => assert_eq!(def.field("HI").map(|f| f.range.width()), Some(4)),
            other => panic!("expected bitfield, got {other:?}"),
        }
    }
}
