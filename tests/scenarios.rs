mod common;

use std::sync::Arc;

use idlc::arch::Configuration;
use idlc::idl::analysis::{RawBodies, reachable_functions};
use idlc::idl::ast::{StmtKind, render_body};
use idlc::idl::prune::prune_body;
use idlc::idl::symbols::{Symbol, SymbolTable, Variable};
use idlc::idl::typeck::{Returns, check_body};
use idlc::idl::types::Type;
use idlc::idl::{IdlError, SymbolError};

use common::{arch, body, global_scope};

const Q_BRANCH: &str = "if (implemented?(Extension::Q)) { a = 1; } else { a = 2; }";

fn with_local_a(config: &str) -> SymbolTable {
    let mut symtab = global_scope(config);
    symtab.push();
    symtab
        .add_var("a", Variable::local(Type::bits(8)))
        .expect("local a");
    symtab
}

#[test]
fn xreg_arithmetic_is_annotated_with_xlen() {
    let mut symtab = global_scope("rv32_full");
    let mut parsed = body("XReg x = 5; x = x + 1;");
    check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
    assert_eq!(parsed.statements[0].ty, Some(Type::bits(32)));
    let StmtKind::Assign { value, .. } = &parsed.statements[1].kind else {
        panic!("expected an assignment");
    };
    assert_eq!(value.ty, Some(Type::bits(32)));
}

#[test]
fn differently_sized_operands_do_not_check() {
    let mut symtab = global_scope("rv32_full");
    let mut parsed = body("XReg x = 1'b0; x = x + 2'b01;");
    let err = check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect_err("width mismatch");
    assert!(matches!(err, IdlError::Type(_)), "{err}");
}

#[test]
fn known_absent_extension_prunes_to_the_else_branch() {
    let mut symtab = with_local_a("rv64_full");
    let mut parsed = body(Q_BRANCH);
    check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
    let pruned = prune_body(&parsed, &symtab, Returns::Forbidden).expect("prunes");
    assert_eq!(render_body(&pruned), "a = 2;");
}

#[test]
fn unknown_extension_keeps_both_branches() {
    let mut symtab = with_local_a("rv64_partial");
    let mut parsed = body(Q_BRANCH);
    check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
    let pruned = prune_body(&parsed, &symtab, Returns::Forbidden).expect("prunes");
    assert_eq!(pruned.statements.len(), 1);
    let StmtKind::If { branches, otherwise } = &pruned.statements[0].kind else {
        panic!("expected the if to survive");
    };
    assert_eq!(branches.len(), 1);
    assert!(otherwise.is_some());
    let rendered = render_body(&pruned);
    assert!(rendered.contains("a = 1;") && rendered.contains("a = 2;"), "{rendered}");
}

#[test]
fn reachable_functions_include_transitive_callees() {
    let mut symtab = global_scope("rv64_full");
    let mut parsed = body("Bits<8> v = count_step(8'd1);");
    check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
    let found = reachable_functions(&parsed, &symtab, &RawBodies::new(&symtab)).expect("reachable");
    let names: Vec<_> = found.iter().map(|decl| decl.name.as_str()).collect();
    assert_eq!(names, ["count_step", "bump"]);
}

#[test]
fn duplicates_fail_in_one_scope_but_shadow_across_scopes() {
    let mut symtab = SymbolTable::new(arch(), Arc::new(Configuration::unconfigured("generic")));
    let x = || Symbol::Variable(Variable::local(Type::bits(8)));
    symtab.add("x", x()).expect("first x");
    assert_eq!(symtab.add("x", x()), Err(SymbolError::Duplicate("x".into())));

    symtab.push();
    symtab.add("x", x()).expect("inner x shadows the outer one");
    symtab.pop();
    assert!(symtab.lookup_var("x").is_some());
}
