//! One compilation of an architecture under a configuration.
//!
//! A [`CompilationContext`] owns the frozen global scope and every memo cache. Fragments are
//! parsed once, then type checked and pruned once per symbol-table fingerprint. Caches are
//! concurrent maps where the first writer wins, so [`CompilationContext::check_all`] can fan out
//! across threads without locking around whole passes.

use std::fmt;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::arch::{Architecture, Configuration, Csr, Instruction, Presence, TrapCode};
use crate::idl::analysis::{self, CalleeBodies, RegDetermination};
use crate::idl::ast::{FunctionBody, FunctionDecl};
use crate::idl::codegen;
use crate::idl::error::{IdlError, IdlResult};
use crate::idl::prune;
use crate::idl::symbols::{SymbolTable, VarOrigin, Variable};
use crate::idl::typeck::{self, Returns};
use crate::idl::types::{Qualifiers, Type};
use crate::loader::idl::parse_function_body;

/// An IDL fragment of the architecture, named by the entity that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// `operation()` of an instruction.
    Operation(String),
    /// `sw_read()` of a CSR.
    SwRead(String),
    /// `sw_write(csr_value)` of a CSR field.
    SwWrite { csr: String, field: String },
    /// Body of a global function.
    Function(String),
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Operation(inst) => write!(f, "{inst}.operation()"),
            Fragment::SwRead(csr) => write!(f, "CSR[{csr}].sw_read()"),
            Fragment::SwWrite { csr, field } => write!(f, "CSR[{csr}].{field}.sw_write()"),
            Fragment::Function(name) => write!(f, "{name}()"),
        }
    }
}

type Cache<K> = DashMap<K, Arc<FunctionBody>, RandomState>;
type ScopedKey = (Fragment, [u8; 32]);

/// A fragment that failed [`CompilationContext::check_all`].
#[derive(Debug)]
pub struct CheckFailure {
    pub fragment: Fragment,
    pub xlen: Option<u32>,
    pub error: IdlError,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.xlen {
            Some(xlen) => write!(f, "{} (RV{xlen}): {}", self.fragment, self.error),
            None => write!(f, "{}: {}", self.fragment, self.error),
        }
    }
}

#[derive(Debug, Default)]
pub struct CheckReport {
    /// Fragments checked, failures included.
    pub checked: usize,
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CompilationContext {
    symtab: SymbolTable,
    parsed: Cache<Fragment>,
    checked: Cache<ScopedKey>,
    pruned: Cache<ScopedKey>,
}

impl CompilationContext {
    /// Builds the frozen global scope for `arch` under `config`.
    pub fn new(arch: Arc<Architecture>, config: Arc<Configuration>) -> IdlResult<Self> {
        let symtab = SymbolTable::for_architecture(arch, config)?;
        Ok(Self {
            symtab,
            parsed: DashMap::with_hasher(RandomState::new()),
            checked: DashMap::with_hasher(RandomState::new()),
            pruned: DashMap::with_hasher(RandomState::new()),
        })
    }

    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    pub fn arch(&self) -> &Arc<Architecture> {
        self.symtab.arch()
    }

    pub fn config(&self) -> &Arc<Configuration> {
        self.symtab.config()
    }

    // Parsed trees.

    pub fn operation_ast(&self, inst: &str) -> IdlResult<Arc<FunctionBody>> {
        self.ast(&Fragment::Operation(inst.to_string()))
    }

    pub fn sw_read_ast(&self, csr: &str) -> IdlResult<Arc<FunctionBody>> {
        self.ast(&Fragment::SwRead(csr.to_string()))
    }

    pub fn sw_write_ast(&self, csr: &str, field: &str) -> IdlResult<Arc<FunctionBody>> {
        self.ast(&Fragment::SwWrite {
            csr: csr.to_string(),
            field: field.to_string(),
        })
    }

    pub fn function_ast(&self, name: &str) -> IdlResult<Arc<FunctionBody>> {
        self.ast(&Fragment::Function(name.to_string()))
    }

    // Type-checked trees.

    pub fn type_checked_operation_ast(&self, inst: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.type_checked(&Fragment::Operation(inst.to_string()), xlen)
    }

    pub fn type_checked_sw_read_ast(&self, csr: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.type_checked(&Fragment::SwRead(csr.to_string()), xlen)
    }

    pub fn type_checked_sw_write_ast(&self, csr: &str, field: &str, xlen: u32) -> IdlResult<Arc<FunctionBody>> {
        let fragment = Fragment::SwWrite {
            csr: csr.to_string(),
            field: field.to_string(),
        };
        self.type_checked(&fragment, Some(xlen))
    }

    pub fn type_checked_function_ast(&self, name: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.type_checked(&Fragment::Function(name.to_string()), xlen)
    }

    // Pruned trees.

    pub fn pruned_operation_ast(&self, inst: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.pruned(&Fragment::Operation(inst.to_string()), xlen)
    }

    pub fn pruned_sw_read_ast(&self, csr: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.pruned(&Fragment::SwRead(csr.to_string()), xlen)
    }

    pub fn pruned_sw_write_ast(&self, csr: &str, field: &str, xlen: u32) -> IdlResult<Arc<FunctionBody>> {
        let fragment = Fragment::SwWrite {
            csr: csr.to_string(),
            field: field.to_string(),
        };
        self.pruned(&fragment, Some(xlen))
    }

    pub fn pruned_function_ast(&self, name: &str, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        self.pruned(&Fragment::Function(name.to_string()), xlen)
    }

    /// Parsed tree of `fragment`, shared by every scope it is checked in.
    pub fn ast(&self, fragment: &Fragment) -> IdlResult<Arc<FunctionBody>> {
        if let Some(hit) = self.parsed.get(fragment) {
            trace!(%fragment, "parse cache hit");
            return Ok(hit.value().clone());
        }
        let body = Arc::new(self.parse(fragment)?);
        debug!(%fragment, statements = body.statements.len(), "parsed");
        Ok(self.parsed.entry(fragment.clone()).or_insert(body).value().clone())
    }

    /// Type-annotated copy of `fragment`, checked under `xlen` when given.
    pub fn type_checked(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        let (mut scope, returns) = self.scope(fragment, xlen)?;
        let key = (fragment.clone(), scope.fingerprint());
        if let Some(hit) = self.checked.get(&key) {
            trace!(%fragment, ?xlen, "type check cache hit");
            return Ok(hit.value().clone());
        }
        let mut body = FunctionBody::clone(&*self.ast(fragment)?);
        typeck::check_body(&mut body, &mut scope, returns)?;
        debug!(%fragment, ?xlen, "type checked");
        Ok(self.checked.entry(key).or_insert(Arc::new(body)).value().clone())
    }

    /// Configuration-pruned copy of the type-checked `fragment`.
    pub fn pruned(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<Arc<FunctionBody>> {
        let (scope, returns) = self.scope(fragment, xlen)?;
        let key = (fragment.clone(), scope.fingerprint());
        if let Some(hit) = self.pruned.get(&key) {
            trace!(%fragment, ?xlen, "prune cache hit");
            return Ok(hit.value().clone());
        }
        let checked = self.type_checked(fragment, xlen)?;
        let body = prune::prune_body(&checked, &scope, returns)?;
        Ok(self.pruned.entry(key).or_insert(body).value().clone())
    }

    /// Scope a fragment is checked in: the global scope plus whatever the fragment binds.
    pub fn scope(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<(SymbolTable, Returns)> {
        let mut scope = match xlen {
            Some(xlen) if !self.symtab.possible_xlens().contains(&xlen) => {
                return Err(IdlError::Config(format!(
                    "XLEN {xlen} is not possible under configuration '{}'",
                    self.config().name
                )));
            }
            Some(xlen) => self.symtab.with_xlen(xlen),
            None => self.symtab.deep_clone(),
        };
        scope.push();
        let returns = match fragment {
            Fragment::Operation(inst) => {
                for field in &self.instruction(inst)?.decode_variables {
                    let mut ty = Type::bits(field.width());
                    if field.sign_extend {
                        ty = ty.with_qualifiers(Qualifiers::SIGNED);
                    }
                    scope.add_var(&field.name, Variable::new(ty, VarOrigin::DecodeField).immutable())?;
                }
                Returns::Forbidden
            }
            Fragment::SwRead(csr) => {
                self.csr(csr)?;
                Returns::register_value()
            }
            Fragment::SwWrite { csr, .. } => {
                let def = self.csr(csr)?;
                let xlen = scope.xlen().ok_or_else(|| {
                    IdlError::Config(format!("{fragment} needs an effective XLEN"))
                })?;
                let layout = def
                    .bitfield(xlen)
                    .map_err(|err| IdlError::Architecture(format!("CSR '{csr}': {err}")))?;
                let var = Variable::new(Type::Bitfield(Arc::new(layout)), VarOrigin::Parameter).immutable();
                scope.add_var("csr_value", var)?;
                Returns::register_value()
            }
            Fragment::Function(name) => {
                let decl = self.function(name)?;
                Returns::Expect(typeck::bind_signature(&decl, &mut scope)?)
            }
        };
        Ok((scope, returns))
    }

    // Analyses over pruned trees.

    pub fn reachable_functions(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<Vec<Arc<FunctionDecl>>> {
        let (scope, _) = self.scope(fragment, xlen)?;
        let body = self.pruned(fragment, xlen)?;
        analysis::reachable_functions(&body, &scope, &PrunedBodies { ctx: self, xlen })
    }

    /// Every syntactic path of the unpruned fragment, with raw callee bodies.
    pub fn reachable_functions_unevaluated(
        &self,
        fragment: &Fragment,
        xlen: Option<u32>,
    ) -> IdlResult<Vec<Arc<FunctionDecl>>> {
        let (scope, _) = self.scope(fragment, xlen)?;
        let body = self.type_checked(fragment, xlen)?;
        analysis::reachable_functions_unevaluated(&body, &scope)
    }

    pub fn reachable_exceptions(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<Vec<Arc<TrapCode>>> {
        let (scope, _) = self.scope(fragment, xlen)?;
        let body = self.pruned(fragment, xlen)?;
        analysis::reachable_exceptions(&body, &scope, &PrunedBodies { ctx: self, xlen })
    }

    pub fn src_registers(&self, inst: &str, xlen: Option<u32>) -> IdlResult<RegDetermination> {
        let fragment = Fragment::Operation(inst.to_string());
        let (scope, _) = self.scope(&fragment, xlen)?;
        Ok(analysis::find_src_registers(&*self.pruned(&fragment, xlen)?, &scope))
    }

    pub fn dst_registers(&self, inst: &str, xlen: Option<u32>) -> IdlResult<RegDetermination> {
        let fragment = Fragment::Operation(inst.to_string());
        let (scope, _) = self.scope(&fragment, xlen)?;
        Ok(analysis::find_dst_registers(&*self.pruned(&fragment, xlen)?, &scope))
    }

    // Code generation.

    pub fn emit_cpp(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<String> {
        let (scope, _) = self.scope(fragment, xlen)?;
        codegen::emit_cpp(&*self.pruned(fragment, xlen)?, &scope, 0)
    }

    pub fn emit_adoc(&self, fragment: &Fragment, xlen: Option<u32>) -> IdlResult<String> {
        let (scope, _) = self.scope(fragment, xlen)?;
        codegen::emit_adoc(&*self.pruned(fragment, xlen)?, &scope)
    }

    /// Every fragment the configuration can reach, for each XLEN it needs.
    pub fn fragments(&self) -> Vec<(Fragment, Option<u32>)> {
        let arch = self.arch();
        let mut jobs = Vec::new();
        for inst in arch.instructions.values() {
            if inst.operation.is_none() {
                continue;
            }
            if self.symtab.extension_presence(&inst.defined_by) == Presence::No {
                debug!(inst = %inst.name, ext = %inst.defined_by, "skipping unimplemented instruction");
                continue;
            }
            jobs.push((Fragment::Operation(inst.name.clone()), None));
        }
        for csr in arch.csrs.values() {
            if self.symtab.csr_excluded(csr) {
                debug!(csr = %csr.name, ext = %csr.defined_by, "skipping unimplemented CSR");
                continue;
            }
            if csr.sw_read.is_some() {
                jobs.push((Fragment::SwRead(csr.name.clone()), None));
            }
            let writable = csr.fields.iter().filter(|field| field.access.is_writable());
            for field in writable.filter(|field| field.sw_write.is_some()) {
                for xlen in self.symtab.possible_xlens() {
                    let fragment = Fragment::SwWrite {
                        csr: csr.name.clone(),
                        field: field.name.clone(),
                    };
                    jobs.push((fragment, Some(xlen)));
                }
            }
        }
        for decl in self.symtab.functions() {
            if !decl.builtin && decl.body.is_some() {
                jobs.push((Fragment::Function(decl.name.clone()), None));
            }
        }
        jobs
    }

    /// Type checks every reachable fragment in parallel.
    pub fn check_all(&self) -> CheckReport {
        let jobs = self.fragments();
        let failures: Vec<CheckFailure> = jobs
            .par_iter()
            .filter_map(|(fragment, xlen)| {
                self.type_checked(fragment, *xlen).err().map(|error| CheckFailure {
                    fragment: fragment.clone(),
                    xlen: *xlen,
                    error,
                })
            })
            .collect();
        info!(
            config = %self.config().name,
            checked = jobs.len(),
            failed = failures.len(),
            "check complete"
        );
        CheckReport {
            checked: jobs.len(),
            failures,
        }
    }

    fn parse(&self, fragment: &Fragment) -> IdlResult<FunctionBody> {
        let source = match fragment {
            Fragment::Operation(inst) => self.instruction(inst)?.operation.clone(),
            Fragment::SwRead(csr) => self.csr(csr)?.sw_read.clone(),
            Fragment::SwWrite { csr, field } => {
                let def = self.csr(csr)?;
                let field = def.field(field).ok_or_else(|| {
                    IdlError::Architecture(format!("CSR '{csr}' has no field '{field}'"))
                })?;
                field.sw_write.clone()
            }
            Fragment::Function(name) => {
                return self
                    .function(name)?
                    .body
                    .clone()
                    .ok_or_else(|| IdlError::Architecture(format!("function '{name}' has no body")));
            }
        };
        let source = source.ok_or_else(|| IdlError::Architecture(format!("{fragment} is not defined")))?;
        parse_function_body(&source.text, &source.origin())
    }

    fn instruction(&self, name: &str) -> IdlResult<&Arc<Instruction>> {
        self.arch()
            .instruction(name)
            .ok_or_else(|| IdlError::Architecture(format!("unknown instruction '{name}'")))
    }

    fn csr(&self, name: &str) -> IdlResult<&Arc<Csr>> {
        self.arch()
            .csr(name)
            .ok_or_else(|| IdlError::Architecture(format!("unknown CSR '{name}'")))
    }

    fn function(&self, name: &str) -> IdlResult<Arc<FunctionDecl>> {
        self.symtab
            .lookup_function(name)
            .cloned()
            .ok_or_else(|| IdlError::Architecture(format!("unknown function '{name}'")))
    }
}

/// Callee bodies pruned under the caller's configuration and XLEN.
struct PrunedBodies<'a> {
    ctx: &'a CompilationContext,
    xlen: Option<u32>,
}

impl CalleeBodies for PrunedBodies<'_> {
    fn function_body(&self, name: &str) -> IdlResult<Option<Arc<FunctionBody>>> {
        match self.ctx.symtab.lookup_function(name) {
            Some(decl) if !decl.builtin && decl.body.is_some() => {
                self.ctx.pruned_function_ast(name, self.xlen).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn csr_sw_read_body(&self, csr: &str) -> IdlResult<Option<Arc<FunctionBody>>> {
        match self.ctx.arch().csr(csr) {
            Some(def) if def.sw_read.is_some() => self.ctx.pruned_sw_read_ast(csr, self.xlen).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::analysis::RegisterRef;
    use crate::idl::ast::render_body;
    use crate::idl::test_support::{full_config, mini_arch, partial_config};

    fn context(config: Configuration) -> CompilationContext {
        CompilationContext::new(Arc::new(mini_arch()), Arc::new(config)).expect("context")
    }

    #[test]
    fn parsed_and_checked_trees_are_shared() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        let first = ctx.operation_ast("add").expect("parse");
        let second = ctx.operation_ast("add").expect("parse");
        assert!(Arc::ptr_eq(&first, &second));

        let checked = ctx.type_checked_operation_ast("add", None).expect("checks");
        assert!(Arc::ptr_eq(&checked, &ctx.type_checked_operation_ast("add", None).expect("checks")));
        assert!(checked.statements.iter().all(|stmt| stmt.ty.is_some()));
        assert!(first.statements.iter().all(|stmt| stmt.ty.is_none()));
    }

    #[test]
    fn pruned_trees_drop_decided_branches() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        let checked = ctx.type_checked_sw_read_ast("mcount", None).expect("checks");
        assert_eq!(render_body(&checked), "return {56'd0, foo(8'd1)};");
        let generic = ctx.type_checked_function_ast("ones", None).expect("generic body");
        assert_eq!(generic.statements.len(), 2);

        let pruned = ctx.pruned_operation_ast("lw", None).expect("prunes");
        assert!(render_body(&pruned).contains("raise(ExceptionCode::LoadAddressMisaligned"));
    }

    #[test]
    fn unknown_entities_are_architecture_errors() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        assert!(matches!(ctx.operation_ast("nope"), Err(IdlError::Architecture(_))));
        assert!(matches!(ctx.sw_read_ast("misa"), Err(IdlError::Architecture(_))));
        assert!(matches!(ctx.sw_write_ast("mscratch", "NOPE"), Err(IdlError::Architecture(_))));
        assert!(matches!(ctx.function_ast("raise"), Err(IdlError::Architecture(_))));
    }

    #[test]
    fn sw_write_binds_the_csr_layout_per_xlen() {
        let ctx = context(partial_config(&["I", "Sm"], &["S", "U"], 64));
        let body = ctx.type_checked_sw_write_ast("mscratch", "VALUE", 64).expect("checks");
        assert_eq!(render_body(&body), "return csr_value.VALUE;");
        assert!(matches!(
            ctx.type_checked_sw_write_ast("mscratch", "VALUE", 32),
            Err(IdlError::Config(_))
        ));
    }

    #[test]
    fn lower_modes_keep_32_bit_writes_reachable_on_rv64() {
        let ctx = context(partial_config(&["I", "Sm"], &[], 64));
        let body = ctx.type_checked_sw_write_ast("mscratch", "VALUE", 32).expect("checks at 32");
        assert_eq!(render_body(&body), "return csr_value.VALUE;");
        assert!(ctx.fragments().contains(&(
            Fragment::SwWrite {
                csr: "mscratch".into(),
                field: "VALUE".into()
            },
            Some(32)
        )));
    }

    #[test]
    fn register_sets_come_from_the_pruned_operation() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        let decode = |names: &[&str]| {
            RegDetermination::Registers(names.iter().map(|name| RegisterRef::Decode((*name).into())).collect())
        };
        assert_eq!(ctx.src_registers("add", None).expect("src"), decode(&["rs1", "rs2"]));
        assert_eq!(ctx.dst_registers("lw", None).expect("dst"), decode(&["rd"]));
    }

    #[test]
    fn reachability_follows_pruned_callees() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        let names = |decls: Vec<Arc<FunctionDecl>>| decls.iter().map(|decl| decl.name.clone()).collect::<Vec<_>>();
        let found = ctx
            .reachable_functions(&Fragment::SwRead("mcount".into()), None)
            .expect("reachable");
        assert_eq!(names(found), ["foo", "bar"]);

        let raised = ctx
            .reachable_exceptions(&Fragment::Operation("lw".into()), None)
            .expect("exceptions");
        let raised: Vec<_> = raised.iter().map(|code| code.var.as_str()).collect();
        assert_eq!(raised, ["LoadAddressMisaligned"]);
    }

    #[test]
    fn excluded_entities_are_not_checked() {
        let ctx = context(full_config(&["I", "Sm"], 64));
        let fragments = ctx.fragments();
        assert!(fragments.contains(&(Fragment::Operation("add".into()), None)));
        assert!(!fragments.contains(&(Fragment::Operation("mul".into()), None)));
        assert!(fragments.contains(&(
            Fragment::SwWrite {
                csr: "mscratch".into(),
                field: "VALUE".into()
            },
            Some(64)
        )));
        assert!(fragments.contains(&(Fragment::Function("ones".into()), None)));
    }

    #[test]
    fn check_all_reports_every_fragment() {
        let ctx = context(partial_config(&["I", "Sm"], &["S", "U"], 64));
        let report = ctx.check_all();
        assert_eq!(report.checked, ctx.fragments().len());
        let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
        assert!(report.is_clean(), "{failures:#?}");
    }
}
