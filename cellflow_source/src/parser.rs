use crate::ast::*;
use crate::error::SourceError;
use crate::lexer::{Kw, Lexer, SpannedToken, Token};

/// Parse a whole source unit.
pub fn parse(source: &str) -> Result<Module, SourceError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn next_token(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Token) -> bool {
        self.current() == tok
    }

    fn check_kw(&self, kw: Kw) -> bool {
        matches!(self.current(), Token::Kw(k) if *k == kw)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.check(tok) {
            self.next_token();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.check_kw(kw) {
            self.next_token();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SourceError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        SourceError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn unexpected(&self, context: &str) -> SourceError {
        self.error(format!("unexpected {:?} {context}", self.current()))
    }

    fn expect(&mut self, tok: Token) -> Result<(), SourceError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", tok, self.current())))
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> Result<(), SourceError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", kw, self.current())))
        }
    }

    fn expect_name(&mut self) -> Result<String, SourceError> {
        match self.current().clone() {
            Token::Name(name) => {
                self.next_token();
                Ok(name)
            }
            _ => Err(self.unexpected("where a name was expected")),
        }
    }

    // ============================================================
    // Statements
    // ============================================================

    pub fn parse_module(&mut self) -> Result<Module, SourceError> {
        let mut body = Vec::new();
        while !self.check(&Token::Eof) {
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, SourceError> {
        let stmt = match self.current() {
            Token::Kw(Kw::If) => self.parse_if()?,
            Token::Kw(Kw::While) => self.parse_while()?,
            Token::Kw(Kw::For) => self.parse_for()?,
            Token::Kw(Kw::Try) => self.parse_try()?,
            Token::Kw(Kw::With) => self.parse_with()?,
            Token::Kw(Kw::Def) => Stmt::FunctionDef(self.parse_function_def(Vec::new())?),
            Token::Kw(Kw::Async) if matches!(self.peek_nth(1), Token::Kw(Kw::Def)) => {
                Stmt::FunctionDef(self.parse_function_def(Vec::new())?)
            }
            Token::Kw(Kw::Class) => Stmt::ClassDef(self.parse_class_def(Vec::new())?),
            Token::At => self.parse_decorated()?,
            Token::Kw(Kw::Async) => return Err(self.error("only `async def` is supported")),
            _ => return self.parse_simple_statements(),
        };
        Ok(vec![stmt])
    }

    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>, SourceError> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat(&Token::Semicolon) {
            if self.check(&Token::Newline) || self.check(&Token::Eof) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        if !self.eat(&Token::Newline) && !self.check(&Token::Eof) {
            return Err(self.unexpected("at end of statement"));
        }
        Ok(stmts)
    }

    fn parse_small_statement(&mut self) -> Result<Stmt, SourceError> {
        let stmt = match self.current() {
            Token::Kw(Kw::Pass) => {
                self.next_token();
                Stmt::Pass
            }
            Token::Kw(Kw::Break) => {
                self.next_token();
                Stmt::Break
            }
            Token::Kw(Kw::Continue) => {
                self.next_token();
                Stmt::Continue
            }
            Token::Kw(Kw::Return) => {
                self.next_token();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_test_list()?)
                };
                Stmt::Return(value)
            }
            Token::Kw(Kw::Raise) => {
                self.next_token();
                let mut exc = None;
                let mut cause = None;
                if !self.at_statement_end() {
                    exc = Some(self.parse_test()?);
                    if self.eat_kw(Kw::From) {
                        cause = Some(self.parse_test()?);
                    }
                }
                Stmt::Raise { exc, cause }
            }
            Token::Kw(Kw::Assert) => {
                self.next_token();
                let test = self.parse_test()?;
                let msg = if self.eat(&Token::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Stmt::Assert { test, msg }
            }
            Token::Kw(Kw::Del) => {
                self.next_token();
                Stmt::Delete(self.parse_target_list()?)
            }
            Token::Kw(Kw::Global) => {
                self.next_token();
                let mut names = vec![self.expect_name()?];
                while self.eat(&Token::Comma) {
                    names.push(self.expect_name()?);
                }
                Stmt::Global(names)
            }
            Token::Kw(Kw::Import) => self.parse_import()?,
            Token::Kw(Kw::From) => self.parse_import_from()?,
            Token::Kw(Kw::Nonlocal | Kw::Yield) => {
                return Err(self.unexpected("(statement kind not supported)"));
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(stmt)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current(),
            Token::Newline | Token::Semicolon | Token::Eof
        )
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, SourceError> {
        let first = self.parse_test_list_star()?;

        if self.eat(&Token::Colon) {
            let annotation = self.parse_test()?;
            let value = if self.eat(&Token::Assign) {
                Some(self.parse_test_list()?)
            } else {
                None
            };
            return Ok(Stmt::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if let Token::AugAssign(op) = *self.current() {
            self.next_token();
            let value = self.parse_test_list()?;
            return Ok(Stmt::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.check(&Token::Assign) {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat(&Token::Assign) {
                if let Some(previous) = value.take() {
                    targets.push(previous);
                }
                value = Some(self.parse_test_list_star()?);
            }
            let value = value.ok_or_else(|| self.error("assignment without a value"))?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn parse_dotted_name(&mut self) -> Result<String, SourceError> {
        let mut name = self.expect_name()?;
        while self.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> Result<Alias, SourceError> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_name()?
        };
        let asname = if self.eat_kw(Kw::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_import(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::Import)?;
        let mut names = vec![self.parse_alias(true)?];
        while self.eat(&Token::Comma) {
            names.push(self.parse_alias(true)?);
        }
        Ok(Stmt::Import(names))
    }

    fn parse_import_from(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::From)?;
        let mut level = 0;
        loop {
            if self.eat(&Token::Dot) {
                level += 1;
            } else if self.eat(&Token::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_kw(Kw::Import) {
            String::new()
        } else {
            self.parse_dotted_name()?
        };
        self.expect_kw(Kw::Import)?;

        let mut names = Vec::new();
        if self.eat(&Token::Star) {
            names.push(Alias::new("*"));
        } else if self.eat(&Token::LParen) {
            loop {
                names.push(self.parse_alias(false)?);
                if !self.eat(&Token::Comma) || self.check(&Token::RParen) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        } else {
            names.push(self.parse_alias(false)?);
            while self.eat(&Token::Comma) {
                names.push(self.parse_alias(false)?);
            }
        }
        Ok(Stmt::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SourceError> {
        self.expect(Token::Colon)?;
        if !self.eat(&Token::Newline) {
            return self.parse_simple_statements();
        }
        self.expect(Token::Indent)?;
        let mut body = Vec::new();
        while !self.eat(&Token::Dedent) {
            if self.check(&Token::Eof) {
                return Err(self.error("unexpected end of input inside a block"));
            }
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt, SourceError> {
        // `if` or `elif`
        self.next_token();
        let test = self.parse_named_test()?;
        let body = self.parse_block()?;
        let orelse = if self.check_kw(Kw::Elif) {
            vec![self.parse_if()?]
        } else if self.eat_kw(Kw::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn parse_else_block(&mut self) -> Result<Vec<Stmt>, SourceError> {
        if self.eat_kw(Kw::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_while(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::While)?;
        let test = self.parse_named_test()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::While { test, body, orelse })
    }

    fn parse_for(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::For)?;
        let target = self.parse_target()?;
        self.expect_kw(Kw::In)?;
        let iter = self.parse_test_list()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::Try)?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.eat_kw(Kw::Except) {
            let mut kind = None;
            let mut name = None;
            if !self.check(&Token::Colon) {
                kind = Some(self.parse_test()?);
                if self.eat_kw(Kw::As) {
                    name = Some(self.expect_name()?);
                }
            }
            let body = self.parse_block()?;
            handlers.push(ExceptHandler { kind, name, body });
        }
        let orelse = self.parse_else_block()?;
        let finalbody = if self.eat_kw(Kw::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("`try` without `except` or `finally`"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn parse_with(&mut self) -> Result<Stmt, SourceError> {
        self.expect_kw(Kw::With)?;
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let target = if self.eat_kw(Kw::As) {
                Some(self.parse_star_or_bitor()?)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::With { items, body })
    }

    fn parse_decorated(&mut self) -> Result<Stmt, SourceError> {
        let mut decorators = Vec::new();
        while self.eat(&Token::At) {
            decorators.push(self.parse_test()?);
            self.expect(Token::Newline)?;
        }
        match self.current() {
            Token::Kw(Kw::Def | Kw::Async) => {
                Ok(Stmt::FunctionDef(self.parse_function_def(decorators)?))
            }
            Token::Kw(Kw::Class) => Ok(Stmt::ClassDef(self.parse_class_def(decorators)?)),
            _ => Err(self.unexpected("after decorator")),
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> Result<FunctionDef, SourceError> {
        let is_async = self.eat_kw(Kw::Async);
        self.expect_kw(Kw::Def)?;
        let name = self.expect_name()?;
        self.expect(Token::LParen)?;
        let params = self.parse_params(&Token::RParen, true)?;
        self.expect(Token::RParen)?;
        let returns = if self.eat(&Token::Arrow) {
            Some(self.parse_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params,
            body,
            decorators,
            returns,
            is_async,
        })
    }

    /// Parameter list up to (not including) `end`.
    fn parse_params(&mut self, end: &Token, annotated: bool) -> Result<Vec<Param>, SourceError> {
        let mut params = Vec::new();
        let mut keyword_only = false;

        while !self.check(end) {
            let param = if self.eat(&Token::DoubleStar) {
                let name = self.expect_name()?;
                let annotation = self.parse_param_annotation(annotated)?;
                Param {
                    name,
                    annotation,
                    default: None,
                    kind: ParamKind::VarKeywords,
                }
            } else if self.eat(&Token::Star) {
                keyword_only = true;
                if self.check(&Token::Comma) {
                    self.next_token();
                    continue;
                }
                let name = self.expect_name()?;
                let annotation = self.parse_param_annotation(annotated)?;
                Param {
                    name,
                    annotation,
                    default: None,
                    kind: ParamKind::VarArgs,
                }
            } else if self.check(&Token::Slash) {
                return Err(self.error("positional-only parameters are not supported"));
            } else {
                let name = self.expect_name()?;
                let annotation = self.parse_param_annotation(annotated)?;
                let default = if self.eat(&Token::Assign) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Param {
                    name,
                    annotation,
                    default,
                    kind: if keyword_only {
                        ParamKind::KeywordOnly
                    } else {
                        ParamKind::Positional
                    },
                }
            };
            params.push(param);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_param_annotation(&mut self, annotated: bool) -> Result<Option<Expr>, SourceError> {
        if annotated && self.eat(&Token::Colon) {
            Ok(Some(self.parse_test()?))
        } else {
            Ok(None)
        }
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> Result<ClassDef, SourceError> {
        self.expect_kw(Kw::Class)?;
        let name = self.expect_name()?;
        let (bases, keywords) = if self.eat(&Token::LParen) {
            let args = self.parse_call_args()?;
            self.expect(Token::RParen)?;
            args
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(ClassDef {
            name,
            bases,
            keywords,
            body,
            decorators,
        })
    }

    // ============================================================
    // Expressions
    // ============================================================

    /// `a, b` becomes a tuple; a single expression stays as is.
    fn parse_test_list(&mut self) -> Result<Expr, SourceError> {
        self.parse_sequence(Self::parse_test)
    }

    fn parse_test_list_star(&mut self) -> Result<Expr, SourceError> {
        self.parse_sequence(Self::parse_test_or_star)
    }

    fn parse_sequence(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<Expr, SourceError>,
    ) -> Result<Expr, SourceError> {
        let first = item(self)?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(item(self)?);
        }
        Ok(Expr::Tuple(items))
    }

    fn starts_expression(&self) -> bool {
        match self.current() {
            Token::Name(_)
            | Token::Number(_)
            | Token::Str(_)
            | Token::VerbatimStr(_)
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Minus
            | Token::Plus
            | Token::Tilde
            | Token::Star
            | Token::Ellipsis => true,
            Token::Kw(kw) => matches!(
                kw,
                Kw::None | Kw::True | Kw::False | Kw::Not | Kw::Lambda | Kw::Await
            ),
            _ => false,
        }
    }

    fn parse_test_or_star(&mut self) -> Result<Expr, SourceError> {
        if self.eat(&Token::Star) {
            Ok(Expr::Starred(Box::new(self.parse_bitor()?)))
        } else {
            self.parse_named_test()
        }
    }

    /// Assignment/loop target: `a`, `a.b`, `a[i]`, `a, b`.
    fn parse_target(&mut self) -> Result<Expr, SourceError> {
        let mut targets = self.parse_target_list()?;
        if self.eat(&Token::Comma) {
            return Ok(Expr::Tuple(targets));
        }
        if targets.len() == 1 {
            return Ok(targets.remove(0));
        }
        Ok(Expr::Tuple(targets))
    }

    fn parse_target_list(&mut self) -> Result<Vec<Expr>, SourceError> {
        let mut targets = vec![self.parse_star_or_bitor()?];
        while self.check(&Token::Comma) && !self.check_target_end_after_comma() {
            self.next_token();
            targets.push(self.parse_star_or_bitor()?);
        }
        Ok(targets)
    }

    fn check_target_end_after_comma(&self) -> bool {
        matches!(
            self.peek_nth(1),
            Token::Kw(Kw::In) | Token::Newline | Token::Colon | Token::Assign
        )
    }

    fn parse_star_or_bitor(&mut self) -> Result<Expr, SourceError> {
        if self.eat(&Token::Star) {
            Ok(Expr::Starred(Box::new(self.parse_bitor()?)))
        } else {
            self.parse_bitor()
        }
    }

    /// `name := value` where Python allows it, otherwise a plain test.
    fn parse_named_test(&mut self) -> Result<Expr, SourceError> {
        if !matches!(
            (self.current(), self.peek_nth(1)),
            (Token::Name(_), Token::ColonEq)
        ) {
            return self.parse_test();
        }
        let target = self.expect_name()?;
        self.expect(Token::ColonEq)?;
        let value = self.parse_test()?;
        Ok(Expr::NamedExpr {
            target,
            value: Box::new(value),
        })
    }

    pub fn parse_test(&mut self) -> Result<Expr, SourceError> {
        if self.check_kw(Kw::Lambda) {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if self.eat_kw(Kw::If) {
            let test = self.parse_or()?;
            self.expect_kw(Kw::Else)?;
            let orelse = self.parse_test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Expr, SourceError> {
        self.expect_kw(Kw::Lambda)?;
        let params = self.parse_params(&Token::Colon, false)?;
        self.expect(Token::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, SourceError> {
        let first = self.parse_and()?;
        if !self.check_kw(Kw::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, SourceError> {
        let first = self.parse_not()?;
        if !self.check_kw(Kw::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> Result<Expr, SourceError> {
        if self.eat_kw(Kw::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_operator(&mut self) -> Option<CmpOp> {
        let op = match self.current() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::LtE,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::GtE,
            Token::Kw(Kw::In) => CmpOp::In,
            Token::Kw(Kw::Is) => {
                if matches!(self.peek_nth(1), Token::Kw(Kw::Not)) {
                    self.next_token();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            Token::Kw(Kw::Not) if matches!(self.peek_nth(1), Token::Kw(Kw::In)) => {
                self.next_token();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.next_token();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SourceError> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, SourceError>,
        operator: fn(&Token) -> Option<BinOp>,
    ) -> Result<Expr, SourceError> {
        let mut left = operand(self)?;
        while let Some(op) = operator(self.current()) {
            self.next_token();
            let right = operand(self)?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_bitxor, |t| {
            matches!(t, Token::Pipe).then_some(BinOp::BitOr)
        })
    }

    fn parse_bitxor(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_bitand, |t| {
            matches!(t, Token::Caret).then_some(BinOp::BitXor)
        })
    }

    fn parse_bitand(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_shift, |t| {
            matches!(t, Token::Amper).then_some(BinOp::BitAnd)
        })
    }

    fn parse_shift(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_arith, |t| match t {
            Token::LShift => Some(BinOp::LShift),
            Token::RShift => Some(BinOp::RShift),
            _ => None,
        })
    }

    fn parse_arith(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_term, |t| match t {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> Result<Expr, SourceError> {
        self.parse_binary_level(Self::parse_factor, |t| match t {
            Token::Star => Some(BinOp::Mult),
            Token::Slash => Some(BinOp::Div),
            Token::DoubleSlash => Some(BinOp::FloorDiv),
            Token::Percent => Some(BinOp::Mod),
            Token::At => Some(BinOp::MatMult),
            _ => None,
        })
    }

    fn parse_factor(&mut self) -> Result<Expr, SourceError> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.next_token();
        let operand = self.parse_factor()?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, SourceError> {
        let base = if self.eat_kw(Kw::Await) {
            Expr::Await(Box::new(self.parse_primary()?))
        } else {
            self.parse_primary()?
        };
        if self.eat(&Token::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, SourceError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current() {
                Token::Dot => {
                    self.next_token();
                    let attr = self.expect_name()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                Token::LParen => {
                    self.next_token();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(Token::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                Token::LBracket => {
                    self.next_token();
                    let slice = self.parse_subscript_list()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        slice: Box::new(slice),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Arguments up to the closing parenthesis (not consumed).
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), SourceError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check(&Token::RParen) {
            if self.eat(&Token::DoubleStar) {
                keywords.push(Keyword::unpack(self.parse_test()?));
            } else if self.eat(&Token::Star) {
                args.push(Expr::Starred(Box::new(self.parse_test()?)));
            } else if matches!(self.current(), Token::Name(_))
                && matches!(self.peek_nth(1), Token::Assign)
            {
                let arg = self.expect_name()?;
                self.expect(Token::Assign)?;
                keywords.push(Keyword::named(arg, self.parse_test()?));
            } else {
                let value = self.parse_named_test()?;
                if self.check_kw(Kw::For) {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(value),
                        generators,
                    });
                } else {
                    args.push(value);
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript_list(&mut self) -> Result<Expr, SourceError> {
        let first = self.parse_subscript()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_subscript(&mut self) -> Result<Expr, SourceError> {
        let lower = if self.check(&Token::Colon) {
            None
        } else {
            let value = self.parse_test()?;
            if !self.check(&Token::Colon) {
                return Ok(value);
            }
            Some(Box::new(value))
        };
        self.expect(Token::Colon)?;
        let slice_end = |p: &Self| {
            matches!(
                p.current(),
                Token::Colon | Token::Comma | Token::RBracket
            )
        };
        let upper = if slice_end(self) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&Token::Colon) && !slice_end(self) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, SourceError> {
        let mut generators = Vec::new();
        while self.eat_kw(Kw::For) {
            let target = self.parse_target()?;
            self.expect_kw(Kw::In)?;
            let iter = self.parse_or()?;
            let mut ifs = Vec::new();
            while self.eat_kw(Kw::If) {
                ifs.push(self.parse_or()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> Result<Expr, SourceError> {
        let expr = match self.current().clone() {
            Token::Name(name) => {
                self.next_token();
                Expr::Name(name)
            }
            Token::Number(text) => {
                self.next_token();
                let hex = text.starts_with("0x") || text.starts_with("0X");
                let is_float = !hex && text.contains(['.', 'e', 'E', 'j', 'J']);
                Expr::Constant(if is_float {
                    Constant::Float(text)
                } else {
                    Constant::Int(text)
                })
            }
            Token::Str(_) | Token::VerbatimStr(_) => self.parse_strings()?,
            Token::Kw(Kw::None) => {
                self.next_token();
                Expr::Constant(Constant::None)
            }
            Token::Kw(Kw::True) => {
                self.next_token();
                Expr::Constant(Constant::Bool(true))
            }
            Token::Kw(Kw::False) => {
                self.next_token();
                Expr::Constant(Constant::Bool(false))
            }
            Token::Ellipsis => {
                self.next_token();
                Expr::Constant(Constant::Ellipsis)
            }
            Token::LParen => self.parse_paren()?,
            Token::LBracket => self.parse_list()?,
            Token::LBrace => self.parse_brace()?,
            _ => return Err(self.unexpected("in expression")),
        };
        Ok(expr)
    }

    /// Adjacent literals concatenate; plain ones merge into one constant.
    fn parse_strings(&mut self) -> Result<Expr, SourceError> {
        let mut plain = String::new();
        let mut verbatim: Vec<String> = Vec::new();
        loop {
            match self.current().clone() {
                Token::Str(s) => {
                    if verbatim.is_empty() {
                        plain.push_str(&s);
                    } else {
                        verbatim.push(crate::render::quote_str(&s));
                    }
                }
                Token::VerbatimStr(s) => {
                    if verbatim.is_empty() && !plain.is_empty() {
                        verbatim.push(crate::render::quote_str(&plain));
                    }
                    verbatim.push(s);
                }
                _ => break,
            }
            self.next_token();
        }
        if verbatim.is_empty() {
            Ok(Expr::Constant(Constant::Str(plain)))
        } else {
            Ok(Expr::Constant(Constant::Verbatim(verbatim.join(" "))))
        }
    }

    fn parse_paren(&mut self) -> Result<Expr, SourceError> {
        self.expect(Token::LParen)?;
        if self.eat(&Token::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.check_kw(Kw::Yield) {
            return Err(self.error("`yield` expressions are not supported"));
        }
        let first = self.parse_test_or_star()?;
        if self.check_kw(Kw::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(Token::RParen)?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(first),
                generators,
            });
        }
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RParen) {
                break;
            }
            items.push(self.parse_test_or_star()?);
        }
        self.expect(Token::RParen)?;
        Ok(Expr::Tuple(items))
    }

    fn parse_list(&mut self) -> Result<Expr, SourceError> {
        self.expect(Token::LBracket)?;
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_test_or_star()?;
        if self.check_kw(Kw::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_test_or_star()?);
        }
        self.expect(Token::RBracket)?;
        Ok(Expr::List(items))
    }

    fn parse_brace(&mut self) -> Result<Expr, SourceError> {
        self.expect(Token::LBrace)?;
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        if self.check(&Token::DoubleStar) {
            return Err(self.error("dict unpacking is not supported"));
        }
        let first = self.parse_test_or_star()?;

        if self.eat(&Token::Colon) {
            let value = self.parse_test()?;
            if self.check_kw(Kw::For) {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(Token::RBrace)?;
                return Ok(Expr::DictComprehension {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut entries = vec![(first, value)];
            while self.eat(&Token::Comma) {
                if self.check(&Token::RBrace) {
                    break;
                }
                let key = self.parse_test()?;
                self.expect(Token::Colon)?;
                entries.push((key, self.parse_test()?));
            }
            self.expect(Token::RBrace)?;
            return Ok(Expr::Dict(entries));
        }

        if self.check_kw(Kw::For) {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(Token::RBrace)?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBrace) {
                break;
            }
            items.push(self.parse_test_or_star()?);
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Set(items))
    }
}
