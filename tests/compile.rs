mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use idlc::compile::Fragment;
use idlc::idl::IdlError;
use idlc::idl::analysis::{RegDetermination, RegisterRef};
use idlc::idl::ast::render_body;
use idlc::loader::ArchLoader;

use common::context;

fn operation(name: &str) -> Fragment {
    Fragment::Operation(name.to_string())
}

#[test]
fn sample_definitions_check_under_every_config() {
    for config in ["rv64_full", "rv64_partial", "rv32_full"] {
        let ctx = context(config);
        let report = ctx.check_all();
        let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
        assert!(report.is_clean(), "{config}: {failures:#?}");
        assert!(report.checked > 0);
    }
}

#[test]
fn unimplemented_extensions_are_skipped() {
    let rv64 = context("rv64_full").fragments();
    assert!(!rv64.contains(&(operation("mul"), None)));
    let rv32 = context("rv32_full").fragments();
    assert!(rv32.contains(&(operation("mul"), None)));
    let partial = context("rv64_partial").fragments();
    assert!(partial.contains(&(operation("mul"), None)), "M may be present");
}

#[test]
fn parallel_checks_share_one_tree_per_fragment() {
    let ctx = context("rv64_partial");
    let ctx = &ctx;
    let trees: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    assert!(ctx.check_all().is_clean());
                    ctx.type_checked_operation_ast("lw", None).expect("lw checks")
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join().expect("worker")).collect()
    });
    assert!(trees.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn pruning_follows_the_configuration() {
    let full = context("rv64_full").pruned(&operation("fround"), None).expect("prunes");
    let rendered = render_body(&full);
    assert!(rendered.ends_with("X[rd] = 0;"), "{rendered}");
    assert!(!rendered.contains("implemented?"), "{rendered}");

    let partial = context("rv64_partial").pruned(&operation("fround"), None).expect("prunes");
    assert!(render_body(&partial).contains("implemented?(Extension::Q)"));
}

#[test]
fn exceptions_depend_on_parameters() {
    let raised = |config: &str, inst: &str| -> Vec<String> {
        context(config)
            .reachable_exceptions(&operation(inst), None)
            .expect("exceptions")
            .iter()
            .map(|code| code.var.clone())
            .collect()
    };
    assert_eq!(raised("rv64_full", "lw"), ["LoadAddressMisaligned"]);
    assert!(raised("rv32_full", "lw").is_empty(), "misaligned loads are allowed on rv32");
    assert_eq!(raised("rv64_full", "ebreak"), ["Breakpoint"]);
}

#[test]
fn csr_reads_reach_their_helpers() {
    let ctx = context("rv64_full");
    let found = ctx
        .reachable_functions(&Fragment::SwRead("mcount".into()), None)
        .expect("reachable");
    let names: Vec<_> = found.iter().map(|decl| decl.name.as_str()).collect();
    assert_eq!(names, ["count_step", "bump"]);

    let adoc = ctx
        .emit_adoc(&Fragment::SwRead("mcount".into()), None)
        .expect("adoc");
    assert!(adoc.contains("xref:funcs:funcs.adoc#udb:doc:func:count_step[count_step]"), "{adoc}");
}

#[test]
fn register_sets_and_cpp_for_add() {
    let ctx = context("rv64_full");
    let decode = |names: &[&str]| {
        RegDetermination::Registers(names.iter().map(|name| RegisterRef::Decode((*name).into())).collect())
    };
    assert_eq!(ctx.src_registers("add", None).expect("src"), decode(&["rs1", "rs2"]));
    assert_eq!(ctx.dst_registers("add", None).expect("dst"), decode(&["rd"]));

    let cpp = ctx.emit_cpp(&operation("add"), None).expect("cpp");
    assert_eq!(cpp, "__hart->set_xreg(rd, __hart->xreg(rs1) + __hart->xreg(rs2));\n");
}

#[test]
fn sw_write_needs_a_possible_xlen() {
    let ctx = context("rv64_full");
    ctx.pruned_sw_write_ast("mscratch", "VALUE", 64).expect("rv64 write");
    assert!(matches!(
        ctx.pruned_sw_write_ast("mscratch", "VALUE", 32),
        Err(IdlError::Config(_))
    ));
}

#[test]
fn duplicate_trap_names_are_rejected_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dup.toml");
    fs::write(
        &path,
        r#"
name = "dup"

[[exceptions]]
name = "Breakpoint"
var = "Breakpoint"
num = 3
defined_by = "I"

[[exceptions]]
name = "Another breakpoint"
var = "Breakpoint"
num = 4
defined_by = "I"
"#,
    )
    .expect("write description");
    let err = ArchLoader::new().load(&path).expect_err("duplicate variable names");
    assert!(matches!(err, IdlError::Architecture(_)), "{err}");
}
