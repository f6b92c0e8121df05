//! Scope stack with a shared, frozen global scope.

use std::sync::Arc;

use ahash::RandomState;
use indexmap::IndexMap;
use semver::VersionReq;
use sha2::{Digest, Sha256};

use crate::arch::{Architecture, Configuration, Csr, Presence};
use crate::idl::ast::FunctionDecl;
use crate::idl::error::SymbolError;
use crate::idl::types::{Type, bit_length};
use crate::idl::value::Value;

use super::symbol::{Symbol, VarOrigin, Variable};

#[derive(Clone, Debug, Default)]
struct Scope {
    symbols: IndexMap<Arc<str>, Symbol, RandomState>,
    frozen: bool,
}

/// Ordered stack of scopes. Index 0 is the global scope.
///
/// Scopes are reference counted and copied on write, so clones never observe each other's
/// additions and the frozen global scope is shared rather than copied.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    scopes: Vec<Arc<Scope>>,
    arch: Arc<Architecture>,
    config: Arc<Configuration>,
    xlen: Option<u32>,
    xlen_binding: Symbol,
}

impl SymbolTable {
    /// Table with an empty, writable global scope.
    pub fn new(arch: Arc<Architecture>, config: Arc<Configuration>) -> Self {
        let xlen = config.fixed_xlen();
        Self {
            scopes: vec![Arc::new(Scope::default())],
            arch,
            config,
            xlen,
            xlen_binding: xlen_binding(xlen),
        }
    }

    pub fn arch(&self) -> &Arc<Architecture> {
        &self.arch
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn levels(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self) {
        self.scopes.push(Arc::new(Scope::default()));
    }

    /// Discards the innermost scope.
    ///
    /// # Panics
    ///
    /// Panics when only the global scope is left.
    pub fn pop(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "unbalanced symbol table pop: the global scope cannot be removed"
        );
        self.scopes.pop();
    }

    /// Binds `name` in the innermost scope.
    pub fn add(&mut self, name: &str, symbol: Symbol) -> Result<(), SymbolError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Err(SymbolError::Frozen(name.to_string()));
        };
        if scope.frozen {
            return Err(SymbolError::Frozen(name.to_string()));
        }
        if scope.symbols.contains_key(name) {
            return Err(SymbolError::Duplicate(name.to_string()));
        }
        Arc::make_mut(scope).symbols.insert(Arc::from(name), symbol);
        Ok(())
    }

    pub fn add_var(&mut self, name: &str, var: Variable) -> Result<(), SymbolError> {
        self.add(name, Symbol::Variable(var))
    }

    /// Innermost binding of `name`.
    pub fn get(&self, name: &str) -> Result<&Symbol, SymbolError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
            .or_else(|| (name == "XLEN").then_some(&self.xlen_binding))
            .ok_or_else(|| SymbolError::Undefined(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Whether `name` is bound in the innermost scope.
    pub fn in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.symbols.contains_key(name))
    }

    pub fn lookup_var(&self, name: &str) -> Option<&Variable> {
        self.get(name).ok().and_then(Symbol::as_variable)
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        match self.get(name) {
            Ok(Symbol::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn lookup_function(&self, name: &str) -> Option<&Arc<FunctionDecl>> {
        match self.get(name) {
            Ok(Symbol::Function(decl)) => Some(decl),
            _ => None,
        }
    }

    /// Global function declarations in definition order.
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDecl>> {
        self.scopes[0].symbols.values().filter_map(|symbol| match symbol {
            Symbol::Function(decl) => Some(decl),
            _ => None,
        })
    }

    /// Records the known value of the innermost binding of `name`.
    pub fn set_value(&mut self, name: &str, value: Option<Value>) -> Result<(), SymbolError> {
        let idx = self
            .scopes
            .iter()
            .rposition(|scope| scope.symbols.contains_key(name))
            .ok_or_else(|| SymbolError::Undefined(name.to_string()))?;
        if self.scopes[idx].frozen {
            return Err(SymbolError::Frozen(name.to_string()));
        }
        match Arc::make_mut(&mut self.scopes[idx]).symbols.get_mut(name) {
            Some(Symbol::Variable(var)) => {
                var.value = value;
                Ok(())
            }
            _ => Err(SymbolError::Undefined(name.to_string())),
        }
    }

    /// Independent copy of every scope.
    pub fn deep_clone(&self) -> SymbolTable {
        let scopes = self
            .scopes
            .iter()
            .enumerate()
            .map(|(idx, scope)| {
                if idx == 0 {
                    scope.clone()
                } else {
                    Arc::new(Scope::clone(scope))
                }
            })
            .collect();
        SymbolTable {
            scopes,
            ..self.clone()
        }
    }

    /// Copy holding only the global scope.
    pub fn global_clone(&self) -> SymbolTable {
        SymbolTable {
            scopes: vec![self.scopes[0].clone()],
            arch: self.arch.clone(),
            config: self.config.clone(),
            xlen: self.xlen,
            xlen_binding: self.xlen_binding.clone(),
        }
    }

    /// Makes every current scope immutable.
    ///
    /// Scopes pushed afterwards stay writable, so checks extend a frozen baseline without touching it.
    pub fn deep_freeze(&mut self) {
        for scope in &mut self.scopes {
            if !scope.frozen {
                Arc::make_mut(scope).frozen = true;
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.scopes.last().is_some_and(|scope| scope.frozen)
    }

    pub fn xlen(&self) -> Option<u32> {
        self.xlen
    }

    /// Copy of this table checking under a single effective XLEN.
    pub fn with_xlen(&self, xlen: u32) -> SymbolTable {
        let mut table = self.deep_clone();
        table.xlen = Some(xlen);
        table.xlen_binding = xlen_binding(Some(xlen));
        table
    }

    pub fn possible_xlens(&self) -> Vec<u32> {
        match self.xlen {
            Some(xlen) => vec![xlen],
            None => self.config.possible_xlens(),
        }
    }

    /// Value of an architecture parameter, including the effective `XLEN`.
    pub fn param_value(&self, name: &str) -> Option<Value> {
        if name == "XLEN" {
            return self.xlen.map(|xlen| Value::unsized_int(u128::from(xlen)));
        }
        match self.scopes[0].symbols.get(name) {
            Some(Symbol::Variable(var)) if var.origin == VarOrigin::ArchParam => var.value.clone(),
            _ => self.config.param_value(name).cloned(),
        }
    }

    pub fn extension_presence(&self, name: &str) -> Presence {
        self.config.extension_presence(name)
    }

    pub fn extension_version_presence(&self, name: &str, req: &VersionReq) -> Presence {
        self.config.extension_version_presence(name, req)
    }

    pub fn csr(&self, name: &str) -> Option<&Arc<Csr>> {
        self.arch.csr(name)
    }

    /// Whether the configuration rules out the extension defining `csr`.
    pub fn csr_excluded(&self, csr: &Csr) -> bool {
        self.extension_presence(&csr.defined_by) == Presence::No
    }

    /// Digest of the configuration, effective XLEN and every local binding.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.arch.name.as_bytes());
        hasher.update(self.config.fingerprint());
        hasher.update(self.xlen.unwrap_or(0).to_le_bytes());
        for scope in self.scopes.iter().skip(1) {
            hasher.update(b"{");
            for (name, symbol) in &scope.symbols {
                hasher.update(name.as_bytes());
                hasher.update(b":");
                hasher.update(symbol.to_string().as_bytes());
                hasher.update(b";");
            }
            hasher.update(b"}");
        }
        hasher.finalize().into()
    }
}

fn xlen_binding(xlen: Option<u32>) -> Symbol {
    match xlen {
        Some(xlen) => Symbol::Variable(Variable::constant(
            Type::unsized_const(bit_length(u128::from(xlen))),
            Value::unsized_int(u128::from(xlen)),
            VarOrigin::ArchParam,
        )),
        None => Symbol::Variable(Variable::new(Type::unsized_const(7), VarOrigin::ArchParam).immutable()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::test_support::{full_config, mini_arch};

    fn table() -> SymbolTable {
        SymbolTable::new(Arc::new(mini_arch()), Arc::new(full_config(&["I"], 64)))
    }

    #[test]
    fn duplicate_in_same_scope_fails_but_shadowing_succeeds() {
        let mut table = table();
        table.push();
        table
            .add_var("x", Variable::local(Type::bits(8)))
            .expect("first x");
        let err = table
            .add_var("x", Variable::local(Type::bits(8)))
            .expect_err("second x in the same scope");
        assert_eq!(err, SymbolError::Duplicate("x".into()));

        table.push();
        table
            .add_var("x", Variable::local(Type::bits(16)))
            .expect("shadowing x");
        assert_eq!(table.lookup_var("x").map(|v| v.ty.clone()), Some(Type::bits(16)));
        table.pop();
        assert_eq!(table.lookup_var("x").map(|v| v.ty.clone()), Some(Type::bits(8)));
        table.pop();
        assert_eq!(table.get("x"), Err(SymbolError::Undefined("x".into())));
    }

    #[test]
    fn frozen_scopes_reject_additions() {
        let mut table = table();
        table.deep_freeze();
        let err = table
            .add_var("g", Variable::local(Type::Boolean))
            .expect_err("frozen");
        assert_eq!(err, SymbolError::Frozen("g".into()));
        table.push();
        assert!(!table.is_frozen());
        table
            .add_var("g", Variable::local(Type::Boolean))
            .expect("locals above a frozen scope are writable");
        table.pop();
        assert!(table.is_frozen());
        let err = table
            .add_var("h", Variable::local(Type::Boolean))
            .expect_err("still frozen");
        assert_eq!(err, SymbolError::Frozen("h".into()));
        assert!(!table.contains("g"));
    }

    #[test]
    #[should_panic(expected = "unbalanced symbol table pop")]
    fn popping_the_global_scope_panics() {
        let mut table = table();
        table.pop();
    }

    #[test]
    fn clones_do_not_observe_each_other() {
        let mut table = table();
        table.deep_freeze();
        table.push();
        table
            .add_var("a", Variable::local(Type::bits(1)))
            .expect("a");
        let mut copy = table.deep_clone();
        copy.add_var("b", Variable::local(Type::bits(1))).expect("b");
        assert!(!table.contains("b"));
        assert!(copy.contains("a"));

        let fresh = table.global_clone();
        assert_eq!(fresh.levels(), 1);
        assert!(!fresh.contains("a"));
    }

    #[test]
    fn xlen_follows_configuration_and_overrides() {
        let table = table();
        assert_eq!(table.xlen(), Some(64));
        assert_eq!(table.param_value("XLEN"), Some(Value::unsized_int(64)));

        let generic = SymbolTable::new(Arc::new(mini_arch()), Arc::new(Configuration::unconfigured("generic")));
        assert_eq!(generic.xlen(), None);
        assert_eq!(generic.possible_xlens(), vec![32, 64]);
        assert_eq!(generic.with_xlen(32).param_value("XLEN"), Some(Value::unsized_int(32)));
    }

    #[test]
    fn fingerprint_tracks_locals_and_values() {
        let mut table = table();
        table.push();
        let empty = table.fingerprint();
        table
            .add_var("N", Variable::local(Type::bits(8)).immutable())
            .expect("N");
        let declared = table.fingerprint();
        assert_ne!(empty, declared);
        table
            .set_value("N", Some(Value::unsized_int(3)))
            .expect("value");
        assert_ne!(declared, table.fingerprint());
        assert_eq!(table.fingerprint(), table.deep_clone().fingerprint());
    }
}
