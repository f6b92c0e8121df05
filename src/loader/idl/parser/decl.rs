use crate::idl::ast::{
    BitfieldDecl, BitfieldFieldDecl, EnumDecl, EnumMemberDecl, Expr, ExprKind, FunctionBody,
    FunctionDecl, Item, Param, Stmt, StmtKind, StructDecl, TypeExpr,
};
use crate::idl::error::{IdlError, IdlResult};
use crate::loader::idl::lexer::parse_literal;

use super::{Parser, TokenKind};

impl Parser {
    pub(super) fn parse_item(&mut self) -> IdlResult<Item> {
        if self.check_keyword("enum") {
            return self.parse_enum().map(Item::Enum);
        }
        if self.check_keyword("bitfield") {
            return self.parse_bitfield().map(Item::Bitfield);
        }
        if self.check_keyword("struct") {
            return self.parse_struct().map(Item::Struct);
        }
        if self.check_keyword("function") || self.check_keyword("builtin") {
            return self.parse_function().map(Item::Function);
        }
        if self.check_keyword("include") {
            return Err(self.error_here(
                "parser.include-unsupported",
                "include directives must be resolved by the architecture loader",
            ));
        }

        let stmt = self.parse_statement()?;
        match &stmt.kind {
            StmtKind::Declare { init: Some(_), .. } => Ok(Item::Constant(stmt)),
            _ => Err(IdlError::parse(
                "parser.global-statement",
                "only declarations with an initializer may appear at global scope",
                Some(stmt.span.clone()),
            )),
        }
    }

    fn parse_enum(&mut self) -> IdlResult<EnumDecl> {
        let start = self.expect_keyword("enum")?;
        let name = self.expect_identifier("enum name")?;
        self.expect(TokenKind::LBrace, "'{' to open enum")?;
        let mut members = Vec::new();
        while !self.match_token(TokenKind::RBrace) {
            let member = self.expect_identifier("enum member or '}'")?;
            let value = if self.check(TokenKind::Number) {
                Some(self.parse_number_expr()?)
            } else {
                None
            };
            members.push(EnumMemberDecl {
                name: member,
                value,
            });
        }
        Ok(EnumDecl {
            name,
            members,
            span: self.span_from(&start),
        })
    }

    fn parse_bitfield(&mut self) -> IdlResult<BitfieldDecl> {
        let start = self.expect_keyword("bitfield")?;
        self.expect(TokenKind::LParen, "'(' before bitfield width")?;
        let width = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after bitfield width")?;
        let name = self.expect_identifier("bitfield name")?;
        self.expect(TokenKind::LBrace, "'{' to open bitfield")?;
        let mut fields = Vec::new();
        while !self.match_token(TokenKind::RBrace) {
            let field = self.expect_identifier("bitfield field or '}'")?;
            let msb = self.parse_number_expr()?;
            let lsb = if self.match_token(TokenKind::Minus) {
                Some(self.parse_number_expr()?)
            } else {
                None
            };
            fields.push(BitfieldFieldDecl {
                name: field,
                msb,
                lsb,
            });
        }
        Ok(BitfieldDecl {
            name,
            width,
            fields,
            span: self.span_from(&start),
        })
    }

    fn parse_struct(&mut self) -> IdlResult<StructDecl> {
        let start = self.expect_keyword("struct")?;
        let name = self.expect_identifier("struct name")?;
        self.expect(TokenKind::LBrace, "'{' to open struct")?;
        let mut fields = Vec::new();
        while !self.match_token(TokenKind::RBrace) {
            let ty = self.parse_type_expr()?;
            let field = self.expect_identifier("struct field name")?;
            self.expect(TokenKind::Semicolon, "';' after struct field")?;
            fields.push(Param { ty, name: field });
        }
        Ok(StructDecl {
            name,
            fields,
            span: self.span_from(&start),
        })
    }

    fn parse_function(&mut self) -> IdlResult<FunctionDecl> {
        let start = self.peek().clone();
        let builtin = self.match_keyword("builtin");
        self.expect_keyword("function")?;
        let mut name = self.expect_identifier("function name")?;
        if self.match_token(TokenKind::Question) {
            name.push('?');
        }
        self.expect(TokenKind::LBrace, "'{' to open function")?;

        let mut decl = FunctionDecl {
            name,
            templates: Vec::new(),
            returns: Vec::new(),
            params: Vec::new(),
            description: None,
            body: None,
            builtin,
            span: self.token_span(&start),
        };

        while !self.match_token(TokenKind::RBrace) {
            if self.check(TokenKind::RawBlock) {
                decl.description = Some(self.consume().lexeme);
            } else if self.match_keyword("template") {
                decl.templates = self.parse_param_list()?;
            } else if self.match_keyword("arguments") {
                decl.params = self.parse_param_list()?;
            } else if self.match_keyword("returns") {
                decl.returns = self.parse_return_types()?;
            } else if self.check_keyword("body") {
                let body_start = self.consume();
                if decl.builtin {
                    return Err(IdlError::parse(
                        "parser.builtin-body",
                        format!("builtin function '{}' cannot have a body", decl.name),
                        Some(self.token_span(&body_start)),
                    ));
                }
                let statements = self.parse_braced_statements()?;
                decl.body = Some(FunctionBody {
                    statements,
                    span: self.span_from(&body_start),
                });
            } else {
                return Err(self.unexpected("function section"));
            }
        }

        if !decl.builtin && decl.body.is_none() {
            return Err(IdlError::parse(
                "parser.missing-body",
                format!("function '{}' has no body", decl.name),
                Some(self.span_from(&start)),
            ));
        }
        decl.span = self.span_from(&start);
        Ok(decl)
    }

    fn parse_braced_statements(&mut self) -> IdlResult<Vec<Stmt>> {
        if !self.check(TokenKind::LBrace) {
            return Err(self.unexpected("'{' to open body"));
        }
        self.parse_block()
    }

    fn parse_param_list(&mut self) -> IdlResult<Vec<Param>> {
        let mut params = Vec::new();
        loop {
            let ty = self.parse_type_expr()?;
            let name = self.expect_identifier("parameter name")?;
            params.push(Param { ty, name });
            if !self.match_token(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    fn parse_return_types(&mut self) -> IdlResult<Vec<TypeExpr>> {
        let mut types = vec![self.parse_type_expr()?];
        while self.match_token(TokenKind::Comma) {
            types.push(self.parse_type_expr()?);
        }
        Ok(types)
    }

    fn parse_number_expr(&mut self) -> IdlResult<Expr> {
        let token = self.expect(TokenKind::Number, "number")?;
        let literal = parse_literal(&token.lexeme).map_err(|message| {
            IdlError::parse("parser.invalid-literal", message, Some(self.token_span(&token)))
        })?;
        Ok(Expr::new(ExprKind::Literal(literal), self.token_span(&token)))
    }
}
