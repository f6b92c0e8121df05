//! Asciidoc pseudocode listings with cross references.

use crate::idl::ast::{FunctionBody, NameStyle, render_body_with};
use crate::idl::error::IdlResult;
use crate::idl::symbols::SymbolTable;

use super::untyped;

/// Links global functions and CSRs into the manual; builtins and locals print plainly.
pub struct AdocStyle<'a> {
    symtab: &'a SymbolTable,
}

impl<'a> AdocStyle<'a> {
    pub fn new(symtab: &'a SymbolTable) -> Self {
        Self { symtab }
    }
}

impl NameStyle for AdocStyle<'_> {
    fn function(&self, name: &str) -> String {
        match self.symtab.lookup_function(name) {
            Some(decl) if !decl.builtin => format!("xref:funcs:funcs.adoc#udb:doc:func:{name}[{name}]"),
            _ => name.to_string(),
        }
    }

    fn csr(&self, csr: &str) -> String {
        if self.symtab.csr(csr).is_some() {
            format!("xref:csrs:{csr}.adoc#udb:doc:csr:{csr}[{csr}]")
        } else {
            csr.to_string()
        }
    }

    fn csr_field(&self, csr: &str, field: &str) -> String {
        let known = self.symtab.csr(csr).is_some_and(|def| def.field(field).is_some());
        if known {
            format!("xref:csrs:{csr}.adoc#udb:doc:csr_field:{csr}:{field}[{field}]")
        } else {
            field.to_string()
        }
    }
}

/// Source listing block for a checked fragment, comments and layout preserved.
pub fn emit_adoc(body: &FunctionBody, symtab: &SymbolTable) -> IdlResult<String> {
    if let Some(stmt) = body.statements.iter().find(|stmt| stmt.ty.is_none()) {
        return Err(untyped(&stmt.span));
    }
    let mut out = String::from("[source,idl,subs=\"specialchars,macros\"]\n----\n");
    let listing = render_body_with(body, &AdocStyle::new(symtab));
    if !listing.is_empty() {
        out.push_str(&listing);
        out.push('\n');
    }
    out.push_str("----\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::test_support::{body, symtab_full};
    use crate::idl::typeck::{self, Returns};

    #[test]
    fn functions_and_csrs_become_links() {
        let mut symtab = symtab_full(&["I", "Sm"], 64);
        let mut parsed = body("# scratch\nBits<8> v = foo(8'd1);\nif (CSR[misa].MXL == 2) {\n  v = 0;\n}");
        typeck::check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
        let out = emit_adoc(&parsed, &symtab).expect("emits");
        let expected = "[source,idl,subs=\"specialchars,macros\"]\n----\n\
                        # scratch\n\
                        Bits<8> v = xref:funcs:funcs.adoc#udb:doc:func:foo[foo](8'd1);\n\
                        if (CSR[xref:csrs:misa.adoc#udb:doc:csr:misa[misa]].xref:csrs:misa.adoc#udb:doc:csr_field:misa:MXL[MXL] == 2) {\n  \
                        v = 0;\n\
                        }\n\
                        ----\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn builtins_print_plainly() {
        let mut symtab = symtab_full(&["I"], 64);
        let mut parsed = body("raise(ExceptionCode::Breakpoint, mode(), 0);");
        typeck::check_body(&mut parsed, &mut symtab, Returns::Forbidden).expect("checks");
        let out = emit_adoc(&parsed, &symtab).expect("emits");
        assert!(out.contains("raise(ExceptionCode::Breakpoint, mode(), 0);"), "{out}");
    }
}
