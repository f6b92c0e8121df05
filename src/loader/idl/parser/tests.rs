use crate::idl::ast::{
    BinaryOp, CsrAccess, ExprKind, Item, LiteralWidth, StmtKind, TypeRef, render_body,
};
use crate::loader::idl::{SourceOrigin, parse_declarations, parse_expression, parse_function_body};

fn origin() -> SourceOrigin {
    SourceOrigin::inline("<test>")
}

fn body(src: &str) -> crate::idl::ast::FunctionBody {
    parse_function_body(src, &origin()).expect("parse body")
}

#[test]
fn parses_declaration_and_assignment() {
    let parsed = body("XReg x = 5; x = x + 1;");
    assert_eq!(parsed.statements.len(), 2);
    match &parsed.statements[0].kind {
        StmtKind::Declare { ty, vars, init } => {
            assert_eq!(ty.kind, TypeRef::Named("XReg".into()));
            assert_eq!(vars[0].name, "x");
            assert!(init.is_some(), "initializer should be captured");
        }
        other => panic!("expected declaration, got {other:?}"),
    }
    match &parsed.statements[1].kind {
        StmtKind::Assign { targets, value } => {
            assert_eq!(targets.len(), 1);
            assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
        }
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn parsing_is_deterministic() {
    let src = "if (implemented?(ExtensionName::C)) { X[rd] = {X[rs1][15:0], 16'h0}; }";
    assert_eq!(body(src), body(src), "identical text must yield identical trees");
}

#[test]
fn precedence_follows_c_rules() {
    let expr = parse_expression("a + b * c == d << 1 && e", &origin()).expect("parse");
    assert_eq!(expr.to_string(), "a + b * c == d << 1 && e");
    match expr.kind {
        ExprKind::Binary { op, .. } => assert_eq!(op, BinaryOp::LogicalAnd),
        other => panic!("unexpected root {other:?}"),
    }
    let grouped = parse_expression("(a + b) * c", &origin()).expect("parse");
    assert_eq!(grouped.to_string(), "(a + b) * c", "printer keeps needed parentheses");
}

#[test]
fn distinguishes_template_calls_from_comparisons() {
    let call = parse_expression("read_memory<32>(addr)", &origin()).expect("call");
    match call.kind {
        ExprKind::Call {
            function,
            templates,
            args,
        } => {
            assert_eq!(function, "read_memory");
            assert_eq!(templates.len(), 1);
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected templated call, got {other:?}"),
    }
    let cmp = parse_expression("a < 32", &origin()).expect("comparison");
    assert!(matches!(cmp.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
}

#[test]
fn parses_csr_references() {
    let field = parse_expression("CSR[mstatus].MIE", &origin()).expect("field");
    assert!(matches!(
        field.kind,
        ExprKind::Csr { ref csr, access: CsrAccess::Field(ref name) } if csr == "mstatus" && name == "MIE"
    ));
    let method = parse_expression("CSR[misa].sw_read()", &origin()).expect("method");
    assert!(matches!(method.kind, ExprKind::Csr { access: CsrAccess::Method { .. }, .. }));
}

#[test]
fn parses_parameter_sized_literals_and_replication() {
    let expr = parse_expression("{XLEN{1'b1}} | XLEN'b0", &origin()).expect("parse");
    let ExprKind::Binary { lhs, rhs, .. } = expr.kind else {
        panic!("expected binary");
    };
    assert!(matches!(lhs.kind, ExprKind::Replicate { .. }));
    match rhs.kind {
        ExprKind::Literal(literal) => {
            assert_eq!(literal.width, Some(LiteralWidth::Param("XLEN".into())));
        }
        other => panic!("expected literal, got {other:?}"),
    }
}

#[test]
fn parses_multi_assignment_and_control_flow() {
    let parsed = body(
        "(lo, hi) = split(value);\n\
         for (U32 i = 0; i < 4; i++) { total = total + i; }\n\
         if (a) { b = 1; } else if (c) { b = 2; } else { b = 3; }\n\
         while (false) { b = 4; }",
    );
    assert!(matches!(&parsed.statements[0].kind, StmtKind::Assign { targets, .. } if targets.len() == 2));
    assert!(matches!(parsed.statements[1].kind, StmtKind::For { .. }));
    match &parsed.statements[2].kind {
        StmtKind::If {
            branches,
            otherwise,
        } => {
            assert_eq!(branches.len(), 2);
            assert!(otherwise.is_some());
        }
        other => panic!("expected if, got {other:?}"),
    }
    assert!(matches!(parsed.statements[3].kind, StmtKind::While { .. }));
}

#[test]
fn keeps_leading_comments_and_prints_them() {
    let parsed = body("# clear the flag\nflag = 0;");
    assert_eq!(parsed.statements[0].comments, vec!["clear the flag".to_string()]);
    assert_eq!(render_body(&parsed), "# clear the flag\nflag = 0;");
}

#[test]
fn printed_bodies_reparse_to_the_same_text() {
    let src = "if (x == 0) {\n  raise(ExceptionCode::IllegalInstruction, mode(), $encoding);\n} else {\n  X[rd] = x[XLEN - 1:0];\n}";
    let first = render_body(&body(src));
    let second = render_body(&body(&first));
    assert_eq!(first, second);
}

#[test]
fn parses_global_declarations() {
    let src = r#"
        enum PrivilegeMode { M 0b11 S 0b01 U 0b00 }
        bitfield (64) Satp { MODE 63-60 ASID 59-44 PPN 43-0 }
        struct Pair { Bits<8> lo; Bits<8> hi; }
        Bits<7> OPCODE_OP = 7'b0110011;
        builtin function raise {
          arguments ExceptionCode code, PrivilegeMode from_mode, XReg value
          description { Raise an exception. }
        }
        function sext {
          template U32 N
          returns XReg
          arguments Bits<N> value
          description { Sign extend. }
          body { return {{XLEN - N{value[N - 1]}}, value}; }
        }
    "#;
    let file = parse_declarations(src, &origin()).expect("declarations");
    assert_eq!(file.items.len(), 6);
    assert!(matches!(&file.items[0], Item::Enum(decl) if decl.members.len() == 3));
    assert!(matches!(&file.items[1], Item::Bitfield(decl) if decl.fields.len() == 3));
    assert!(matches!(&file.items[2], Item::Struct(decl) if decl.fields.len() == 2));
    assert!(matches!(&file.items[3], Item::Constant(_)));
    match &file.items[4] {
        Item::Function(decl) => {
            assert!(decl.builtin);
            assert_eq!(decl.params.len(), 3);
            assert_eq!(decl.description.as_deref(), Some("Raise an exception."));
        }
        other => panic!("expected builtin, got {other:?}"),
    }
    match &file.items[5] {
        Item::Function(decl) => {
            assert_eq!(decl.templates.len(), 1);
            assert!(decl.body.is_some());
        }
        other => panic!("expected function, got {other:?}"),
    }
}

#[test]
fn errors_carry_fragment_locations() {
    let origin = SourceOrigin::new("arch/csr/mstatus.toml", 20);
    let err = parse_function_body("x = 1;\ny = ;", &origin).expect_err("missing operand");
    let diag = err.diagnostic().expect("diagnostic");
    assert_eq!(diag.code, "parser.unexpected-token");
    let span = diag.span.as_ref().expect("span");
    assert_eq!(span.start.line, 21, "line is offset by the fragment origin");
    assert!(err.to_string().contains("arch/csr/mstatus.toml:21:5"), "{err}");
}

#[test]
fn rejects_invalid_assignment_targets() {
    let err = parse_function_body("f(x) = 1;", &origin()).expect_err("call is not assignable");
    assert_eq!(
        err.diagnostic().map(|diag| diag.code),
        Some("parser.invalid-assignment-target")
    );
}
