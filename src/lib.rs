//! Compiler core for the RISC-V instruction description language (IDL).
//!
//! The pipeline runs lexing and parsing (`loader::idl`), symbol resolution (`idl::symbols`),
//! type checking (`idl::typeck`), configuration pruning (`idl::prune`), analyses
//! (`idl::analysis`) and code generation (`idl::codegen`). `compile::CompilationContext` ties
//! the stages together for one architecture and configuration.

pub mod arch;
pub mod compile;
pub mod idl;
pub mod loader;
