#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use idlc::arch::{Architecture, Configuration};
use idlc::compile::CompilationContext;
use idlc::idl::ast::FunctionBody;
use idlc::idl::symbols::SymbolTable;
use idlc::loader::ArchLoader;
use idlc::loader::idl::{SourceOrigin, parse_function_body};

pub fn defs() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("defs")
}

pub fn arch() -> Arc<Architecture> {
    let arch = ArchLoader::new()
        .load(defs().join("rv_mini.toml"))
        .expect("sample architecture");
    Arc::new(arch)
}

pub fn config(name: &str) -> Arc<Configuration> {
    let path = defs().join("configs").join(format!("{name}.toml"));
    Arc::new(Configuration::from_path(&path).expect("sample configuration"))
}

pub fn context(config_name: &str) -> CompilationContext {
    CompilationContext::new(arch(), config(config_name)).expect("compilation context")
}

pub fn global_scope(config_name: &str) -> SymbolTable {
    SymbolTable::for_architecture(arch(), config(config_name)).expect("global scope")
}

pub fn body(text: &str) -> FunctionBody {
    parse_function_body(text, &SourceOrigin::inline("<test>")).expect("body parses")
}
