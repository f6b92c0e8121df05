use crate::idl::ast::{
    Branch, CsrAccess, Declarator, Expr, ExprKind, Stmt, StmtKind, TypeExpr, TypeRef,
};
use crate::idl::error::IdlResult;

use super::{Parser, TokenKind};

impl Parser {
    pub(super) fn parse_statement(&mut self) -> IdlResult<Stmt> {
        let start = self.peek().clone();
        let mut stmt = if self.check_keyword("if") {
            self.parse_if()?
        } else if self.check_keyword("for") {
            self.parse_for()?
        } else if self.check_keyword("while") {
            self.parse_while()?
        } else if self.check_keyword("return") {
            self.parse_return()?
        } else {
            let stmt = self.parse_simple_statement()?;
            self.expect(TokenKind::Semicolon, "';' after statement")?;
            stmt
        };
        stmt.span = self.span_from(&start);
        stmt.comments = start.comments;
        Ok(stmt)
    }

    /// Braced statement list, or a single statement.
    pub(super) fn parse_block(&mut self) -> IdlResult<Vec<Stmt>> {
        if !self.match_token(TokenKind::LBrace) {
            return Ok(vec![self.parse_statement()?]);
        }
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::EOF) {
                return Err(self.unexpected("'}' to close block"));
            }
            if self.match_token(TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.consume();
        Ok(statements)
    }

    fn parse_if(&mut self) -> IdlResult<Stmt> {
        let start = self.expect_keyword("if")?;
        let mut branches = vec![self.parse_branch()?];
        let mut otherwise = None;
        while self.match_keyword("else") {
            if self.match_keyword("if") {
                branches.push(self.parse_branch()?);
            } else {
                otherwise = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Stmt::new(
            StmtKind::If {
                branches,
                otherwise,
            },
            self.span_from(&start),
        ))
    }

    fn parse_branch(&mut self) -> IdlResult<Branch> {
        self.expect(TokenKind::LParen, "'(' before condition")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        let body = self.parse_block()?;
        Ok(Branch { cond, body })
    }

    fn parse_for(&mut self) -> IdlResult<Stmt> {
        let start = self.expect_keyword("for")?;
        self.expect(TokenKind::LParen, "'(' after 'for'")?;
        let init = self.parse_simple_statement()?;
        self.expect(TokenKind::Semicolon, "';' after loop initializer")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;
        let update = self.parse_simple_statement()?;
        self.expect(TokenKind::RParen, "')' to close loop header")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                init: Box::new(init),
                cond,
                update: Box::new(update),
                body,
            },
            self.span_from(&start),
        ))
    }

    fn parse_while(&mut self) -> IdlResult<Stmt> {
        let start = self.expect_keyword("while")?;
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after loop condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { cond, body }, self.span_from(&start)))
    }

    fn parse_return(&mut self) -> IdlResult<Stmt> {
        let start = self.expect_keyword("return")?;
        let mut values = Vec::new();
        if !self.check(TokenKind::Semicolon) {
            values.push(self.parse_expression()?);
            while self.match_token(TokenKind::Comma) {
                values.push(self.parse_expression()?);
            }
        }
        self.expect(TokenKind::Semicolon, "';' after return")?;
        Ok(Stmt::new(StmtKind::Return(values), self.span_from(&start)))
    }

    /// Declaration, assignment, increment or expression without the trailing `;`.
    pub(super) fn parse_simple_statement(&mut self) -> IdlResult<Stmt> {
        let start = self.peek().clone();
        if self.at_declaration() {
            return self.parse_declaration();
        }
        if self.check(TokenKind::LParen) {
            if let Some(stmt) = self.try_multi_assignment()? {
                return Ok(stmt);
            }
        }

        let expr = self.parse_expression()?;
        let kind = if self.match_token(TokenKind::Equals) {
            self.validate_target(&expr)?;
            let value = self.parse_expression()?;
            StmtKind::Assign {
                targets: vec![expr],
                value,
            }
        } else if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let increment = self.consume().kind == TokenKind::PlusPlus;
            self.validate_target(&expr)?;
            StmtKind::Step {
                target: expr,
                increment,
            }
        } else {
            StmtKind::Expr(expr)
        };
        Ok(Stmt::new(kind, self.span_from(&start)))
    }

    /// `signed ...`, `Bits<...> name`, or `TypeName name`.
    fn at_declaration(&self) -> bool {
        let first = self.peek();
        if first.kind != TokenKind::Identifier {
            return false;
        }
        match first.lexeme.as_str() {
            "signed" => true,
            "Bits" => self.peek_at(1).kind == TokenKind::LessThan,
            _ => self.peek_at(1).kind == TokenKind::Identifier,
        }
    }

    pub(super) fn parse_declaration(&mut self) -> IdlResult<Stmt> {
        let start = self.peek().clone();
        let ty = self.parse_type_expr()?;
        let mut vars = Vec::new();
        loop {
            let name_token = self.expect(TokenKind::Identifier, "variable name")?;
            let array = if self.match_token(TokenKind::LBracket) {
                let size = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']' after array size")?;
                Some(size)
            } else {
                None
            };
            vars.push(Declarator {
                name: name_token.lexeme.clone(),
                array,
                span: self.span_from(&name_token),
            });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        let init = if self.match_token(TokenKind::Equals) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::Declare { ty, vars, init },
            self.span_from(&start),
        ))
    }

    pub(super) fn parse_type_expr(&mut self) -> IdlResult<TypeExpr> {
        let start = self.peek().clone();
        let signed = self.match_keyword("signed");
        let name = self.expect_identifier("type name")?;
        let kind = if name == "Bits" {
            self.expect(TokenKind::LessThan, "'<' after Bits")?;
            let width = self.parse_shift()?;
            self.expect(TokenKind::GreaterThan, "'>' to close Bits width")?;
            TypeRef::Bits(Box::new(width))
        } else {
            TypeRef::Named(name)
        };
        Ok(TypeExpr {
            kind,
            signed,
            span: self.span_from(&start),
        })
    }

    fn try_multi_assignment(&mut self) -> IdlResult<Option<Stmt>> {
        let start = self.peek().clone();
        let checkpoint = self.checkpoint();
        self.consume(); // '('
        let mut targets = Vec::new();
        loop {
            match self.parse_expression() {
                Ok(target) => targets.push(target),
                Err(_) => {
                    self.rewind(checkpoint);
                    return Ok(None);
                }
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        if targets.len() < 2
            || !self.match_token(TokenKind::RParen)
            || !self.match_token(TokenKind::Equals)
        {
            self.rewind(checkpoint);
            return Ok(None);
        }
        for target in &targets {
            self.validate_target(target)?;
        }
        let value = self.parse_expression()?;
        Ok(Some(Stmt::new(
            StmtKind::Assign { targets, value },
            self.span_from(&start),
        )))
    }

    fn validate_target(&self, target: &Expr) -> IdlResult<()> {
        let ok = match &target.kind {
            ExprKind::Var(_) => true,
            ExprKind::Index { base, .. }
            | ExprKind::Slice { base, .. }
            | ExprKind::Member { base, .. } => self.validate_target(base).is_ok(),
            ExprKind::Csr { access, .. } => !matches!(access, CsrAccess::Method { .. }),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(crate::idl::error::IdlError::parse(
                "parser.invalid-assignment-target",
                format!("'{target}' cannot be assigned"),
                Some(target.span.clone()),
            ))
        }
    }
}
