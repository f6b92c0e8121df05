//! In-memory architecture database consumed by the compiler.
//!
//! Records are configuration independent and immutable once built. The YAML database loader
//! that produces them in a full toolchain is an external collaborator; `loader::arch` reads a
//! compact TOML rendition for the command line and tests.

pub mod config;
pub mod entity;
pub mod trap;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::idl::error::{IdlError, IdlResult};

pub use config::{ConfigKind, Configuration, Presence};
pub use entity::{
    Csr, CsrField, CsrLength, DecodeVariable, Extension, ExtensionVersion, FieldAccess,
    FieldLocation, IdlSource, Instruction, ParamDecl, ParamKind,
};
pub use trap::{TrapCode, TrapCodeTable, TrapKind};

#[derive(Debug, Clone)]
pub struct Architecture {
    pub name: String,
    pub params: IndexMap<String, ParamDecl>,
    pub extensions: IndexMap<String, Arc<Extension>>,
    pub csrs: IndexMap<String, Arc<Csr>>,
    pub instructions: IndexMap<String, Arc<Instruction>>,
    pub exceptions: TrapCodeTable,
    pub interrupts: TrapCodeTable,
    /// Files of global IDL declarations (functions, enums, bitfields, constants).
    pub globals: Vec<IdlSource>,
}

impl Architecture {
    pub fn builder(name: impl Into<String>) -> ArchitectureBuilder {
        ArchitectureBuilder::new(name.into())
    }

    pub fn csr(&self, name: &str) -> Option<&Arc<Csr>> {
        self.csrs.get(name)
    }

    pub fn instruction(&self, name: &str) -> Option<&Arc<Instruction>> {
        self.instructions.get(name)
    }

    pub fn extension(&self, name: &str) -> Option<&Arc<Extension>> {
        self.extensions.get(name)
    }

    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.get(name)
    }
}

pub struct ArchitectureBuilder {
    name: String,
    params: IndexMap<String, ParamDecl>,
    extensions: IndexMap<String, Arc<Extension>>,
    csrs: IndexMap<String, Arc<Csr>>,
    instructions: IndexMap<String, Arc<Instruction>>,
    exceptions: Vec<TrapCode>,
    interrupts: Vec<TrapCode>,
    globals: Vec<IdlSource>,
}

impl ArchitectureBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            params: IndexMap::new(),
            extensions: IndexMap::new(),
            csrs: IndexMap::new(),
            instructions: IndexMap::new(),
            exceptions: Vec::new(),
            interrupts: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        let name = name.into();
        self.params.insert(name.clone(), ParamDecl { name, kind });
        self
    }

    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions
            .insert(extension.name.clone(), Arc::new(extension));
        self
    }

    pub fn csr(mut self, csr: Csr) -> Self {
        self.csrs.insert(csr.name.clone(), Arc::new(csr));
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions
            .insert(instruction.name.clone(), Arc::new(instruction));
        self
    }

    pub fn trap(mut self, code: TrapCode) -> Self {
        match code.kind {
            TrapKind::Exception => self.exceptions.push(code),
            TrapKind::Interrupt => self.interrupts.push(code),
        }
        self
    }

    pub fn global(mut self, source: IdlSource) -> Self {
        self.globals.push(source);
        self
    }

    /// Validates cross references and trap code uniqueness.
    pub fn build(self) -> IdlResult<Architecture> {
        let known_extension = |name: &str| self.extensions.is_empty() || self.extensions.contains_key(name);
        for csr in self.csrs.values() {
            if !known_extension(&csr.defined_by) {
                return Err(IdlError::Architecture(format!(
                    "CSR '{}' is defined by unknown extension '{}'",
                    csr.name, csr.defined_by
                )));
            }
        }
        for inst in self.instructions.values() {
            if !known_extension(&inst.defined_by) {
                return Err(IdlError::Architecture(format!(
                    "instruction '{}' is defined by unknown extension '{}'",
                    inst.name, inst.defined_by
                )));
            }
        }
        let exceptions = TrapCodeTable::new(TrapKind::Exception, self.exceptions)?;
        let interrupts = TrapCodeTable::new(TrapKind::Interrupt, self.interrupts)?;
        Ok(Architecture {
            name: self.name,
            params: self.params,
            extensions: self.extensions,
            csrs: self.csrs,
            instructions: self.instructions,
            exceptions,
            interrupts,
            globals: self.globals,
        })
    }
}
