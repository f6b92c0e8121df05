//! Transitive function reachability.

use std::sync::Arc;

use ahash::AHashSet;
use tracing::trace;

use crate::idl::ast::{Expr, FunctionBody, FunctionDecl};
use crate::idl::error::IdlResult;
use crate::idl::symbols::SymbolTable;

use super::{CalleeBodies, Flow, FlowVisitor, RawBodies};

/// Functions reachable from `body`, in order of first appearance.
///
/// Branches the configuration rules out are skipped, and callee bodies come from `bodies`.
/// The result is closed under call: every function a listed function calls is listed too.
pub fn reachable_functions(
    body: &FunctionBody,
    symtab: &SymbolTable,
    bodies: &dyn CalleeBodies,
) -> IdlResult<Vec<Arc<FunctionDecl>>> {
    collect(body, symtab, bodies, true)
}

/// Every function syntactically reachable from `body`, ignoring the configuration.
pub fn reachable_functions_unevaluated(body: &FunctionBody, symtab: &SymbolTable) -> IdlResult<Vec<Arc<FunctionDecl>>> {
    collect(body, symtab, &RawBodies::new(symtab), false)
}

fn collect(
    body: &FunctionBody,
    symtab: &SymbolTable,
    bodies: &dyn CalleeBodies,
    evaluate: bool,
) -> IdlResult<Vec<Arc<FunctionDecl>>> {
    let mut calls = Calls {
        bodies,
        seen: AHashSet::new(),
        csrs: AHashSet::new(),
        found: Vec::new(),
    };
    Flow::new(symtab, evaluate).body(body, &mut calls)?;
    Ok(calls.found)
}

struct Calls<'b> {
    bodies: &'b dyn CalleeBodies,
    seen: AHashSet<String>,
    csrs: AHashSet<String>,
    found: Vec<Arc<FunctionDecl>>,
}

impl FlowVisitor for Calls<'_> {
    fn call(&mut self, flow: &Flow, decl: &Arc<FunctionDecl>, _templates: &[Expr], _args: &[Expr]) -> IdlResult<()> {
        if !self.seen.insert(decl.name.clone()) {
            return Ok(());
        }
        trace!(function = %decl.name, "reachable");
        self.found.push(decl.clone());
        if let Some(body) = self.bodies.function_body(&decl.name)? {
            Flow::for_callee(flow.symtab(), decl, &[], &[], flow.evaluates()).body(&body, self)?;
        }
        Ok(())
    }

    fn csr_read(&mut self, flow: &Flow, csr: &str) -> IdlResult<()> {
        if !self.csrs.insert(csr.to_string()) {
            return Ok(());
        }
        if let Some(body) = self.bodies.csr_sw_read_body(csr)? {
            Flow::new(&flow.symtab().global_clone(), flow.evaluates()).body(&body, self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::test_support::{body, symtab_full, symtab_partial};

    fn names(found: &[Arc<FunctionDecl>]) -> Vec<&str> {
        found.iter().map(|decl| decl.name.as_str()).collect()
    }

    #[test]
    fn calls_are_followed_transitively() {
        let symtab = symtab_full(&["I"], 64);
        let found = reachable_functions(&body("Bits<8> x = foo(8'd1);"), &symtab, &RawBodies::new(&symtab))
            .expect("reachable");
        assert_eq!(names(&found), ["foo", "bar"]);
    }

    #[test]
    fn results_are_deduplicated_in_first_appearance_order() {
        let symtab = symtab_full(&["I"], 64);
        let found = reachable_functions(
            &body("Bits<8> x = bar(8'd1); x = foo(x); x = bar(x);"),
            &symtab,
            &RawBodies::new(&symtab),
        )
        .expect("reachable");
        assert_eq!(names(&found), ["bar", "foo"]);
    }

    #[test]
    fn excluded_branches_are_skipped_unless_unevaluated() {
        let symtab = symtab_full(&["I"], 64);
        let text = "Bits<8> x = 0; if (implemented?(Extension::Q)) { x = foo(x); } else { raise(ExceptionCode::IllegalInstruction, mode(), 0); }";
        let found = reachable_functions(&body(text), &symtab, &RawBodies::new(&symtab)).expect("evaluated");
        assert_eq!(names(&found), ["implemented?", "raise", "mode"]);

        let all = reachable_functions_unevaluated(&body(text), &symtab).expect("unevaluated");
        assert_eq!(names(&all), ["implemented?", "foo", "bar", "raise", "mode"]);
    }

    #[test]
    fn undecided_branches_are_both_walked() {
        let symtab = symtab_partial(&["I"], &[], 64);
        let text = "Bits<8> x = 0; if (implemented?(Extension::Q)) { x = foo(x); } else { x = bar(x); }";
        let found = reachable_functions(&body(text), &symtab, &RawBodies::new(&symtab)).expect("reachable");
        assert_eq!(names(&found), ["implemented?", "foo", "bar"]);
    }

    #[test]
    fn csr_reads_are_followed() {
        let symtab = symtab_full(&["I", "Sm"], 64);
        let found = reachable_functions(&body("Bits<64> c = CSR[mcount].sw_read();"), &symtab, &RawBodies::new(&symtab))
            .expect("reachable");
        assert_eq!(names(&found), ["foo", "bar"]);
    }

    #[test]
    fn result_is_closed_under_call() {
        let symtab = symtab_full(&["I"], 64);
        let bodies = RawBodies::new(&symtab);
        let found = reachable_functions(&body("Bits<8> x = foo(8'd1);"), &symtab, &bodies).expect("reachable");
        for decl in &found {
            let Some(callee) = bodies.function_body(&decl.name).expect("body") else {
                continue;
            };
            for nested in reachable_functions(&callee, &symtab, &bodies).expect("nested") {
                assert!(found.iter().any(|f| f.name == nested.name), "{} missing", nested.name);
            }
        }
    }
}
