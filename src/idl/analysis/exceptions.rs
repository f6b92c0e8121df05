//! Exception codes a fragment can raise.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashSet;
use tracing::{trace, warn};

use crate::arch::TrapCode;
use crate::idl::ast::{Expr, FunctionBody, FunctionDecl, TypeRef};
use crate::idl::error::IdlResult;
use crate::idl::symbols::SymbolTable;
use crate::idl::value::Value;

use super::{CalleeBodies, Flow, FlowVisitor};

/// Exception codes raised by `body` or anything it calls, sorted by number.
///
/// A code comes from any builtin whose first parameter is an `ExceptionCode`. Known argument
/// values flow into callees, so a helper that raises its `code` argument contributes only the
/// codes its callers pass. A code that cannot be folded contributes every exception.
pub fn reachable_exceptions(
    body: &FunctionBody,
    symtab: &SymbolTable,
    bodies: &dyn CalleeBodies,
) -> IdlResult<Vec<Arc<TrapCode>>> {
    let mut raises = Raises {
        bodies,
        visited: AHashSet::new(),
        csrs: AHashSet::new(),
        found: BTreeMap::new(),
    };
    Flow::new(symtab, true).body(body, &mut raises)?;
    Ok(raises.found.into_values().collect())
}

type CallKey = (String, Vec<Option<Value>>, Vec<Option<Value>>);

struct Raises<'b> {
    bodies: &'b dyn CalleeBodies,
    visited: AHashSet<CallKey>,
    csrs: AHashSet<String>,
    found: BTreeMap<u32, Arc<TrapCode>>,
}

fn raises_exception(decl: &FunctionDecl) -> bool {
    decl.builtin
        && decl
            .params
            .first()
            .is_some_and(|param| matches!(&param.ty.kind, TypeRef::Named(name) if name == "ExceptionCode"))
}

impl Raises<'_> {
    fn record(&mut self, flow: &Flow, code: Option<&Expr>) {
        let exceptions = &flow.symtab().arch().exceptions;
        let value = code.and_then(|code| flow.value_of(code));
        match value.as_ref().and_then(Value::as_integer).and_then(|num| u32::try_from(num).ok()) {
            Some(num) => {
                if let Some(code) = exceptions.by_num(num) {
                    trace!(code = %code.var, "raised");
                    self.found.insert(num, code.clone());
                }
            }
            None => {
                let site = code.map(|code| code.span.to_string()).unwrap_or_default();
                warn!(site = %site, "exception code is not a constant; assuming any exception");
                for code in exceptions.iter() {
                    self.found.insert(code.num, code.clone());
                }
            }
        }
    }
}

impl FlowVisitor for Raises<'_> {
    fn call(&mut self, flow: &Flow, decl: &Arc<FunctionDecl>, templates: &[Expr], args: &[Expr]) -> IdlResult<()> {
        if raises_exception(decl) {
            self.record(flow, args.first());
            return Ok(());
        }
        let Some(body) = self.bodies.function_body(&decl.name)? else {
            return Ok(());
        };
        let templates: Vec<_> = templates.iter().map(|item| flow.value_of(item)).collect();
        let args: Vec<_> = args.iter().map(|item| flow.value_of(item)).collect();
        if !self.visited.insert((decl.name.clone(), templates.clone(), args.clone())) {
            return Ok(());
        }
        Flow::for_callee(flow.symtab(), decl, &templates, &args, true).body(&body, self)
    }

    fn csr_read(&mut self, flow: &Flow, csr: &str) -> IdlResult<()> {
        if !self.csrs.insert(csr.to_string()) {
            return Ok(());
        }
        match self.bodies.csr_sw_read_body(csr)? {
            Some(body) => Flow::new(&flow.symtab().global_clone(), true).body(&body, self),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::analysis::RawBodies;
    use crate::idl::test_support::{body, symtab_full, symtab_partial};

    fn vars(codes: &[Arc<TrapCode>]) -> Vec<&str> {
        codes.iter().map(|code| code.var.as_str()).collect()
    }

    #[test]
    fn direct_raises_are_collected_in_numeric_order() {
        let symtab = symtab_full(&["I"], 64);
        let text = "XReg a = 0;\nif (a == 1) { raise(ExceptionCode::LoadAccessFault, mode(), a); }\nraise(ExceptionCode::IllegalInstruction, mode(), a);";
        let found = reachable_exceptions(&body(text), &symtab, &RawBodies::new(&symtab)).expect("exceptions");
        assert_eq!(vars(&found), ["IllegalInstruction", "LoadAccessFault"]);
    }

    #[test]
    fn argument_values_flow_into_callees() {
        let symtab = symtab_full(&["I"], 64);
        let text = "access_fault(ExceptionCode::Breakpoint, 0);";
        let found = reachable_exceptions(&body(text), &symtab, &RawBodies::new(&symtab)).expect("exceptions");
        assert_eq!(vars(&found), ["Breakpoint"]);
    }

    #[test]
    fn unknown_codes_widen_to_every_exception() {
        let symtab = symtab_full(&["I"], 64);
        let text = "ExceptionCode c = ExceptionCode::Breakpoint;\nraise(c, mode(), 0);";
        let found = reachable_exceptions(&body(text), &symtab, &RawBodies::new(&symtab)).expect("exceptions");
        assert_eq!(found.len(), symtab.arch().exceptions.len());
    }

    #[test]
    fn pruned_away_raises_do_not_count() {
        let text = "if (implemented?(Extension::Q)) { raise(ExceptionCode::Mcall, mode(), 0); }";
        let full = symtab_full(&["I"], 64);
        let found = reachable_exceptions(&body(text), &full, &RawBodies::new(&full)).expect("full");
        assert!(found.is_empty());

        let partial = symtab_partial(&["I"], &[], 64);
        let found = reachable_exceptions(&body(text), &partial, &RawBodies::new(&partial)).expect("partial");
        assert_eq!(vars(&found), ["Mcall"]);
    }
}
