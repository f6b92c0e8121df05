use crate::idl::ast::{BinaryOp, CsrAccess, Expr, ExprKind, UnaryOp};
use crate::idl::error::{IdlError, IdlResult};
use crate::loader::idl::lexer::parse_literal;

use super::{Parser, Token, TokenKind};

type Level = fn(&mut Parser) -> IdlResult<Expr>;

impl Parser {
    pub(super) fn parse_expression(&mut self) -> IdlResult<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> IdlResult<Expr> {
        let start = self.peek().clone();
        let cond = self.parse_logical_or()?;
        if !self.match_token(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':' in conditional expression")?;
        let otherwise = self.parse_ternary()?;
        Ok(Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            self.span_from(&start),
        ))
    }

    /// One left-associative precedence level.
    fn parse_binary_level(&mut self, ops: &[(TokenKind, BinaryOp)], next: Level) -> IdlResult<Expr> {
        let start = self.peek().clone();
        let mut expr = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.match_token(*kind) {
                    let rhs = next(self)?;
                    expr = Expr::new(
                        ExprKind::Binary {
                            op: *op,
                            lhs: Box::new(expr),
                            rhs: Box::new(rhs),
                        },
                        self.span_from(&start),
                    );
                    continue 'outer;
                }
            }
            return Ok(expr);
        }
    }

    fn parse_logical_or(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[(TokenKind::DoublePipe, BinaryOp::LogicalOr)],
            Parser::parse_logical_and,
        )
    }

    fn parse_logical_and(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[(TokenKind::DoubleAmpersand, BinaryOp::LogicalAnd)],
            Parser::parse_bit_or,
        )
    }

    fn parse_bit_or(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Pipe, BinaryOp::BitOr)], Parser::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Caret, BinaryOp::BitXor)], Parser::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[(TokenKind::Ampersand, BinaryOp::BitAnd)],
            Parser::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::DoubleEquals, BinaryOp::Eq),
                (TokenKind::BangEquals, BinaryOp::Ne),
            ],
            Parser::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::LessEquals, BinaryOp::Le),
                (TokenKind::LessThan, BinaryOp::Lt),
                (TokenKind::GreaterEquals, BinaryOp::Ge),
                (TokenKind::GreaterThan, BinaryOp::Gt),
            ],
            Parser::parse_shift,
        )
    }

    /// Entry point for contexts where `>` closes a bracket (`Bits<...>`, template arguments).
    pub(super) fn parse_shift(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::ShiftLeft, BinaryOp::Shl),
                (TokenKind::ShiftRightArith, BinaryOp::Sra),
                (TokenKind::ShiftRight, BinaryOp::Shr),
                (TokenKind::WideShiftLeft, BinaryOp::WideShl),
            ],
            Parser::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
                (TokenKind::WidePlus, BinaryOp::WideAdd),
                (TokenKind::WideMinus, BinaryOp::WideSub),
            ],
            Parser::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> IdlResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Asterisk, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
                (TokenKind::WideStar, BinaryOp::WideMul),
            ],
            Parser::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> IdlResult<Expr> {
        let start = self.peek().clone();
        let op = match start.kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.consume();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
            self.span_from(&start),
        ))
    }

    fn parse_postfix(&mut self) -> IdlResult<Expr> {
        let start = self.peek().clone();
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_token(TokenKind::LBracket) {
                let first = self.parse_expression()?;
                let kind = if self.match_token(TokenKind::Colon) {
                    let lo = self.parse_expression()?;
                    ExprKind::Slice {
                        base: Box::new(expr),
                        hi: Box::new(first),
                        lo: Box::new(lo),
                    }
                } else {
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(first),
                    }
                };
                self.expect(TokenKind::RBracket, "']' to close index")?;
                expr = Expr::new(kind, self.span_from(&start));
                continue;
            }
            if self.match_token(TokenKind::Dot) {
                let field = self.expect_identifier("field name after '.'")?;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        field,
                    },
                    self.span_from(&start),
                );
                continue;
            }
            return Ok(expr);
        }
    }

    fn parse_primary(&mut self) -> IdlResult<Expr> {
        let start = self.peek().clone();
        match start.kind {
            TokenKind::Number => {
                self.consume();
                let literal = parse_literal(&start.lexeme).map_err(|message| {
                    IdlError::parse("parser.invalid-literal", message, Some(self.token_span(&start)))
                })?;
                Ok(Expr::new(ExprKind::Literal(literal), self.token_span(&start)))
            }
            TokenKind::String => {
                self.consume();
                Ok(Expr::new(
                    ExprKind::String(start.lexeme.clone()),
                    self.token_span(&start),
                ))
            }
            TokenKind::LParen => {
                self.consume();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')' to close expression")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.parse_concatenation(),
            TokenKind::Identifier => self.parse_identifier_expr(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_concatenation(&mut self) -> IdlResult<Expr> {
        let start = self.expect(TokenKind::LBrace, "'{'")?;
        let first = self.parse_expression()?;
        if self.match_token(TokenKind::LBrace) {
            let inner = self.parse_expression()?;
            self.expect(TokenKind::RBrace, "'}' to close replicated value")?;
            self.expect(TokenKind::RBrace, "'}' to close replication")?;
            return Ok(Expr::new(
                ExprKind::Replicate {
                    count: Box::new(first),
                    expr: Box::new(inner),
                },
                self.span_from(&start),
            ));
        }
        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            items.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBrace, "'}' to close concatenation")?;
        Ok(Expr::new(ExprKind::Concat(items), self.span_from(&start)))
    }

    fn parse_identifier_expr(&mut self) -> IdlResult<Expr> {
        let start = self.consume();
        let name = start.lexeme.clone();
        match name.as_str() {
            "true" => return Ok(Expr::new(ExprKind::Bool(true), self.token_span(&start))),
            "false" => return Ok(Expr::new(ExprKind::Bool(false), self.token_span(&start))),
            "CSR" if self.check(TokenKind::LBracket) => return self.parse_csr_reference(&start),
            _ => {}
        }

        if let Some(builtin) = name.strip_prefix('$') {
            if self.match_token(TokenKind::LParen) {
                let args = self.parse_argument_list()?;
                return Ok(Expr::new(
                    ExprKind::Builtin {
                        name: builtin.to_string(),
                        args,
                    },
                    self.span_from(&start),
                ));
            }
            return Ok(Expr::var(name, self.token_span(&start)));
        }

        if self.match_token(TokenKind::DoubleColon) {
            let member = self.expect_identifier("enum member after '::'")?;
            return Ok(Expr::new(
                ExprKind::EnumMember { ty: name, member },
                self.span_from(&start),
            ));
        }

        if self.match_token(TokenKind::LParen) {
            let args = self.parse_argument_list()?;
            return Ok(Expr::new(
                ExprKind::Call {
                    function: name,
                    templates: Vec::new(),
                    args,
                },
                self.span_from(&start),
            ));
        }

        if self.check(TokenKind::LessThan) {
            if let Some(call) = self.try_template_call(&start)? {
                return Ok(call);
            }
        }

        Ok(Expr::var(name, self.token_span(&start)))
    }

    /// Speculatively parses `<args>(...)`; rewinds and yields `None` when the text is a comparison.
    fn try_template_call(&mut self, start: &Token) -> IdlResult<Option<Expr>> {
        let checkpoint = self.checkpoint();
        self.consume(); // '<'
        let mut templates = Vec::new();
        loop {
            match self.parse_shift() {
                Ok(arg) => templates.push(arg),
                Err(_) => {
                    self.rewind(checkpoint);
                    return Ok(None);
                }
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        if !(self.match_token(TokenKind::GreaterThan) && self.match_token(TokenKind::LParen)) {
            self.rewind(checkpoint);
            return Ok(None);
        }
        let args = self.parse_argument_list()?;
        Ok(Some(Expr::new(
            ExprKind::Call {
                function: start.lexeme.clone(),
                templates,
                args,
            },
            self.span_from(start),
        )))
    }

    fn parse_csr_reference(&mut self, start: &Token) -> IdlResult<Expr> {
        self.expect(TokenKind::LBracket, "'[' after CSR")?;
        let csr = self.expect_identifier("CSR name")?;
        self.expect(TokenKind::RBracket, "']' after CSR name")?;
        let access = if self.match_token(TokenKind::Dot) {
            let member = self.expect_identifier("CSR field or method")?;
            if self.match_token(TokenKind::LParen) {
                CsrAccess::Method {
                    name: member,
                    args: self.parse_argument_list()?,
                }
            } else {
                CsrAccess::Field(member)
            }
        } else {
            CsrAccess::Value
        };
        Ok(Expr::new(ExprKind::Csr { csr, access }, self.span_from(start)))
    }

    /// Arguments after an already consumed `(`, through the closing `)`.
    pub(super) fn parse_argument_list(&mut self) -> IdlResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.match_token(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.match_token(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen, "')' to close argument list")?;
            return Ok(args);
        }
    }
}
