//! Recursive-descent parser from tokens to [`Program`].
//!
//! Expression precedence, loosest first: conditional expression, `or`,
//! `and`, `not`, comparisons (chained), `+ -`, `* / // %`, unary `- + `,
//! `**` (right-associative), then postfix calls, subscripts and attribute
//! access.

use std::rc::Rc;

use crate::ast::{
    BinOp, BoolOp, CmpOp, Expr, FStringPart, FunctionDef, Param, Program, Stmt, StmtKind, Target,
    UnaryOp,
};
use crate::error::SyntaxError;
use crate::lexer::tokenize;
use crate::span::Span;
use crate::token::{Token, TokenKind};

type PResult<T> = Result<T, SyntaxError>;

/// Parses a complete source file.
pub fn parse_program(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

/// Parses a single expression, e.g. the inside of an f-string placeholder.
pub fn parse_expression(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr_list()?;
    parser.eat(&TokenKind::Newline);
    if !parser.check(&TokenKind::Eof) {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Span> {
        if self.check(&kind) {
            Ok(self.bump().span)
        } else {
            Err(SyntaxError::at(
                self.span(),
                format!("expected {}, found {}", kind, self.peek()),
            ))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(SyntaxError::at(
                self.span(),
                format!("expected a name, found {}", other),
            )),
        }
    }

    fn unexpected(&self) -> SyntaxError {
        SyntaxError::at(self.span(), format!("unexpected {}", self.peek()))
    }

    /// True when the current token cannot start another element of an
    /// expression list.
    fn at_list_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Semicolon
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::In
        ) || aug_op(self.peek()).is_some()
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        loop {
            while self.eat(&TokenKind::Newline) {}
            if self.check(&TokenKind::Eof) {
                break;
            }
            body.extend(self.statement()?);
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> PResult<Vec<Stmt>> {
        match self.peek() {
            TokenKind::Def => Ok(vec![self.function_def()?]),
            TokenKind::If => Ok(vec![self.if_stmt()?]),
            TokenKind::While => Ok(vec![self.while_stmt()?]),
            TokenKind::For => Ok(vec![self.for_stmt()?]),
            TokenKind::Indent => Err(SyntaxError::at(self.span(), "unexpected indent")),
            TokenKind::Elif | TokenKind::Else => Err(self.unexpected()),
            _ => self.simple_line(),
        }
    }

    /// One or more `;`-separated simple statements terminated by a newline.
    fn simple_line(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat(&TokenKind::Semicolon) {
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        if !self.eat(&TokenKind::Newline) && !self.check(&TokenKind::Eof) {
            return Err(self.unexpected());
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::Return => {
                self.bump();
                if matches!(
                    self.peek(),
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
                ) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expr_list()?))
                }
            }
            TokenKind::Break => {
                self.bump();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.bump();
                StmtKind::Continue
            }
            TokenKind::Pass => {
                self.bump();
                StmtKind::Pass
            }
            TokenKind::Global => {
                self.bump();
                let mut names = vec![self.expect_name()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_name()?);
                }
                StmtKind::Global(names)
            }
            TokenKind::Import => {
                self.bump();
                let module = self.dotted_name()?;
                let alias = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                StmtKind::Import {
                    module,
                    names: Vec::new(),
                    alias,
                }
            }
            TokenKind::From => {
                self.bump();
                let module = self.dotted_name()?;
                self.expect(TokenKind::Import)?;
                let parens = self.eat(&TokenKind::LParen);
                let mut names = Vec::new();
                loop {
                    let name = self.expect_name()?;
                    let alias = if self.eat(&TokenKind::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat(&TokenKind::Comma) || (parens && self.check(&TokenKind::RParen)) {
                        break;
                    }
                }
                if parens {
                    self.expect(TokenKind::RParen)?;
                }
                StmtKind::Import {
                    module,
                    names,
                    alias: None,
                }
            }
            _ => self.expression_statement(span)?,
        };
        Ok(Stmt { kind, span })
    }

    fn dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn expression_statement(&mut self, span: Span) -> PResult<StmtKind> {
        let first = self.expr_list()?;

        if self.check(&TokenKind::Assign) {
            let mut targets = vec![to_target(first, span)?];
            loop {
                self.bump();
                let rhs = self.expr_list()?;
                if self.check(&TokenKind::Assign) {
                    targets.push(to_target(rhs, span)?);
                } else {
                    return Ok(StmtKind::Assign {
                        targets,
                        value: rhs,
                    });
                }
            }
        }

        if let Some(op) = aug_op(self.peek()) {
            let target = to_target(first, span)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(SyntaxError::at(
                    span,
                    "augmented assignment to a tuple is not allowed",
                ));
            }
            self.bump();
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        // Annotated assignment: `x: int = 0`. The annotation is discarded.
        if self.check(&TokenKind::Colon) {
            let target = to_target(first, span)?;
            self.bump();
            self.expr()?;
            if self.eat(&TokenKind::Assign) {
                let value = self.expr_list()?;
                return Ok(StmtKind::Assign {
                    targets: vec![target],
                    value,
                });
            }
            return Ok(StmtKind::Pass);
        }

        Ok(StmtKind::Expr(first))
    }

    /// Parses `:` followed by either an indented block or a simple line.
    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.simple_line();
        }
        if !self.check(&TokenKind::Indent) {
            return Err(SyntaxError::at(self.span(), "expected an indented block"));
        }
        self.bump();
        let mut body = Vec::new();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.statement()?);
        }
        self.eat(&TokenKind::Dedent);
        Ok(body)
    }

    fn function_def(&mut self) -> PResult<Stmt> {
        let span = self.expect(TokenKind::Def)?;
        let name = self.expect_name()?;
        self.expect(TokenKind::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if matches!(self.peek(), TokenKind::Star | TokenKind::DoubleStar) {
                return Err(SyntaxError::at(
                    self.span(),
                    "variadic parameters are not supported",
                ));
            }
            let param_span = self.span();
            let pname = self.expect_name()?;
            if self.eat(&TokenKind::Colon) {
                self.expr()?;
            }
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(SyntaxError::at(
                    param_span,
                    "non-default parameter follows default parameter",
                ));
            }
            if params.iter().any(|p| p.name == pname) {
                return Err(SyntaxError::at(
                    param_span,
                    format!("duplicate parameter '{}'", pname),
                ));
            }
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        if self.eat(&TokenKind::Arrow) {
            self.expr()?;
        }
        let body = self.block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                params,
                body,
                span,
            })),
            span,
        })
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let span = self.expect(TokenKind::If)?;
        let mut branches = Vec::new();
        let test = self.expr()?;
        branches.push((test, self.block()?));
        let mut orelse = Vec::new();
        loop {
            if self.eat(&TokenKind::Elif) {
                let test = self.expr()?;
                branches.push((test, self.block()?));
            } else if self.eat(&TokenKind::Else) {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            span,
        })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        let span = self.expect(TokenKind::While)?;
        let test = self.expr()?;
        let body = self.block()?;
        if self.check(&TokenKind::Else) {
            return Err(SyntaxError::at(self.span(), "loop 'else' is not supported"));
        }
        Ok(Stmt {
            kind: StmtKind::While { test, body },
            span,
        })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        let span = self.expect(TokenKind::For)?;
        let target = self.for_target()?;
        self.expect(TokenKind::In)?;
        let iter = self.expr_list()?;
        let body = self.block()?;
        if self.check(&TokenKind::Else) {
            return Err(SyntaxError::at(self.span(), "loop 'else' is not supported"));
        }
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body },
            span,
        })
    }

    /// Loop target: names, optionally parenthesized and comma-separated.
    /// Parsed separately from expressions so that `in` is left in place.
    fn for_target(&mut self) -> PResult<Target> {
        let mut items = vec![self.for_target_atom()?];
        let mut tuple = false;
        while self.eat(&TokenKind::Comma) {
            tuple = true;
            if self.check(&TokenKind::In) || self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.for_target_atom()?);
        }
        if tuple {
            Ok(Target::Tuple(items))
        } else {
            Ok(items.remove(0))
        }
    }

    fn for_target_atom(&mut self) -> PResult<Target> {
        if self.eat(&TokenKind::LParen) {
            let inner = self.for_target()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        Ok(Target::Name(self.expect_name()?))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// yields a tuple.
    fn expr_list(&mut self) -> PResult<Expr> {
        let first = self.expr()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_list_end() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expr(&mut self) -> PResult<Expr> {
        if self.check(&TokenKind::Lambda) {
            return Err(SyntaxError::at(
                self.span(),
                "lambda expressions are not supported",
            ));
        }
        let body = self.or_expr()?;
        if !self.eat(&TokenKind::If) {
            return Ok(body);
        }
        let test = self.or_expr()?;
        self.expect(TokenKind::Else)?;
        let orelse = self.expr()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.not_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.arith()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtE => CmpOp::LtE,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtE => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if self.peek_at(1) == &TokenKind::In => {
                    self.bump();
                    CmpOp::NotIn
                }
                TokenKind::Is if self.peek_at(1) == &TokenKind::Not => {
                    self.bump();
                    CmpOp::IsNot
                }
                TokenKind::Is => CmpOp::Is,
                _ => break,
            };
            self.bump();
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn arith(&mut self) -> PResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.term()?;
            left = binary(op, left, right);
        }
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.factor()?;
            left = binary(op, left, right);
        }
    }

    fn factor(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.bump();
        let operand = self.factor()?;
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expr::Int(v)) => Expr::Int(-v),
            (UnaryOp::Neg, Expr::Float(v)) => Expr::Float(-v),
            (op, operand) => Expr::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn power(&mut self) -> PResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.factor()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.bump();
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.subscript()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Subscript {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let name = self.expect_name()?;
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> PResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if matches!(self.peek(), TokenKind::Star | TokenKind::DoubleStar) {
                return Err(SyntaxError::at(
                    self.span(),
                    "argument unpacking is not supported",
                ));
            }
            if let (TokenKind::Name(name), TokenKind::Assign) = (self.peek(), self.peek_at(1)) {
                let name = name.clone();
                self.bump();
                self.bump();
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(SyntaxError::at(
                        self.span(),
                        "positional argument follows keyword argument",
                    ));
                }
                let arg = self.expr()?;
                if self.check(&TokenKind::For) {
                    // Generator argument, evaluated eagerly as a list.
                    args.push(self.comprehension(arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok((args, kwargs))
    }

    /// Subscript contents: an index, a tuple index or a slice.
    fn subscript(&mut self) -> PResult<Expr> {
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(self.expr()?)
        };
        if !self.eat(&TokenKind::Colon) {
            let first = lower.ok_or_else(|| self.unexpected())?;
            if self.check(&TokenKind::Comma) {
                let mut items = vec![first];
                while self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                    items.push(self.expr()?);
                }
                return Ok(Expr::Tuple(items));
            }
            return Ok(first);
        }
        let upper = if matches!(self.peek(), TokenKind::Colon | TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat(&TokenKind::Colon) && !self.check(&TokenKind::RBracket) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice {
            lower: lower.map(Box::new),
            upper,
            step,
        })
    }

    /// Parses `for target in iter [if cond]` following an element.
    fn comprehension(&mut self, element: Expr) -> PResult<Expr> {
        let (target, iter, condition) = self.comprehension_clause()?;
        Ok(Expr::ListComp {
            element: Box::new(element),
            target,
            iter,
            condition,
        })
    }

    #[allow(clippy::type_complexity)]
    fn comprehension_clause(&mut self) -> PResult<(Target, Box<Expr>, Option<Box<Expr>>)> {
        self.expect(TokenKind::For)?;
        let target = self.for_target()?;
        self.expect(TokenKind::In)?;
        let iter = self.or_expr()?;
        let condition = if self.eat(&TokenKind::If) {
            Some(Box::new(self.or_expr()?))
        } else {
            None
        };
        if matches!(self.peek(), TokenKind::For | TokenKind::If) {
            return Err(SyntaxError::at(
                self.span(),
                "nested comprehension clauses are not supported",
            ));
        }
        Ok((target, Box::new(iter), condition))
    }

    fn atom(&mut self) -> PResult<Expr> {
        let tok = self.bump();
        let expr = match tok.kind {
            TokenKind::Int(v) => Expr::Int(v),
            TokenKind::Float(v) => Expr::Float(v),
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::None => Expr::None,
            TokenKind::Name(name) => Expr::Name(name),
            TokenKind::Str(s) => {
                let mut s = s;
                while let TokenKind::Str(next) = self.peek() {
                    s.push_str(next);
                    self.bump();
                }
                Expr::Str(s)
            }
            TokenKind::FStr(raw) => Expr::FString(parse_fstring(&raw, tok.span)?),
            TokenKind::LParen => self.paren_atom()?,
            TokenKind::LBracket => self.list_atom()?,
            TokenKind::LBrace => self.brace_atom()?,
            other => {
                return Err(SyntaxError::at(
                    tok.span,
                    format!("unexpected {}", other),
                ))
            }
        };
        Ok(expr)
    }

    fn paren_atom(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expr()?;
        if self.check(&TokenKind::For) {
            let comp = self.comprehension(first)?;
            self.expect(TokenKind::RParen)?;
            return Ok(comp);
        }
        if !self.check(&TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Tuple(items))
    }

    fn list_atom(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.check(&TokenKind::For) {
            let comp = self.comprehension(first)?;
            self.expect(TokenKind::RBracket)?;
            return Ok(comp);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::List(items))
    }

    fn brace_atom(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat(&TokenKind::Colon) {
            let value = self.expr()?;
            if self.check(&TokenKind::For) {
                let (target, iter, condition) = self.comprehension_clause()?;
                self.expect(TokenKind::RBrace)?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    target,
                    iter,
                    condition,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.expr()?;
                self.expect(TokenKind::Colon)?;
                pairs.push((key, self.expr()?));
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(Expr::Dict(pairs));
        }
        if self.check(&TokenKind::For) {
            // Set comprehension: build the list, then convert.
            let comp = self.comprehension(first)?;
            self.expect(TokenKind::RBrace)?;
            return Ok(Expr::Call {
                func: Box::new(Expr::Name("set".to_string())),
                args: vec![comp],
                kwargs: Vec::new(),
            });
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Set(items))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn aug_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::PlusAssign => BinOp::Add,
        TokenKind::MinusAssign => BinOp::Sub,
        TokenKind::StarAssign => BinOp::Mul,
        TokenKind::SlashAssign => BinOp::Div,
        TokenKind::DoubleSlashAssign => BinOp::FloorDiv,
        TokenKind::PercentAssign => BinOp::Mod,
        _ => return None,
    })
}

fn to_target(expr: Expr, span: Span) -> PResult<Target> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Subscript { object, index } => Ok(Target::Subscript { object, index }),
        Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
            items
                .into_iter()
                .map(|item| to_target(item, span))
                .collect::<PResult<Vec<_>>>()?,
        )),
        Expr::Attribute { name, .. } => Err(SyntaxError::at(
            span,
            format!("cannot assign to attribute '{}'", name),
        )),
        _ => Err(SyntaxError::at(span, "cannot assign to expression")),
    }
}

/// Splits an f-string body into literal and placeholder parts.
fn parse_fstring(raw: &str, span: Span) -> PResult<Vec<FStringPart>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(SyntaxError::at(span, "single '}' is not allowed in f-string")),
            '{' => {
                let mut inner = String::new();
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut spec: Option<String> = None;
                loop {
                    let Some(ch) = chars.next() else {
                        return Err(SyntaxError::at(span, "unterminated f-string placeholder"));
                    };
                    if let Some(q) = quote {
                        if ch == q {
                            quote = None;
                        }
                    } else {
                        match ch {
                            '\'' | '"' => quote = Some(ch),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' => depth = depth.saturating_sub(1),
                            '}' if depth == 0 => break,
                            '}' => depth -= 1,
                            ':' if depth == 0 && spec.is_none() => {
                                spec = Some(String::new());
                                continue;
                            }
                            '!' if depth == 0 && chars.peek() != Some(&'=') && spec.is_none() => {
                                // Conversion flag such as `!r`; rendering uses str().
                                chars.next();
                                continue;
                            }
                            _ => {}
                        }
                    }
                    match spec.as_mut() {
                        Some(s) => s.push(ch),
                        None => inner.push(ch),
                    }
                }
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let expr = parse_expression(inner.trim()).map_err(|e| {
                    SyntaxError::at(span, format!("in f-string placeholder: {}", e.message))
                })?;
                parts.push(FStringPart::Expr(expr, spec));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source).unwrap()
    }

    fn only_expr(source: &str) -> Expr {
        let program = parse(source);
        match &program.body[0].kind {
            StmtKind::Expr(e) => e.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_with_defaults_and_recursion() {
        let program = parse("def fib(n, memo=None):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n\nprint(fib(5))\n");
        assert_eq!(program.body.len(), 2);
        let def = program.functions().next().unwrap();
        assert_eq!(def.name, "fib");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
        assert_eq!(def.body.len(), 2);
        assert_eq!(def.span.line, 1);
        assert_eq!(program.body[1].span.line, 6);
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = only_expr("1 + 2 * 3 ** 2\n");
        let Expr::Binary { op: BinOp::Add, right, .. } = expr else {
            panic!("expected addition at the root");
        };
        let Expr::Binary { op: BinOp::Mul, right, .. } = *right else {
            panic!("expected multiplication");
        };
        assert!(matches!(*right, Expr::Binary { op: BinOp::Pow, .. }));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = only_expr("-2 ** 2\n");
        assert!(matches!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn chained_comparisons_and_membership() {
        let expr = only_expr("0 <= i < n and x not in seen\n");
        let Expr::BoolOp { left, right, .. } = expr else {
            panic!("expected boolean and");
        };
        assert!(matches!(&*left, Expr::Compare { ops, .. } if ops.len() == 2));
        assert!(matches!(&*right, Expr::Compare { ops, .. } if ops[0].0 == CmpOp::NotIn));
    }

    #[test]
    fn assignment_forms() {
        let program = parse("a = b = 0\nx, y = y, x\ndp[i][j] += 1\nn: int = 3\n");
        assert!(matches!(&program.body[0].kind, StmtKind::Assign { targets, .. } if targets.len() == 2));
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::Assign { targets, value: Expr::Tuple(_) } if matches!(targets[0], Target::Tuple(_))
        ));
        assert!(matches!(
            &program.body[2].kind,
            StmtKind::AugAssign { target: Target::Subscript { .. }, op: BinOp::Add, .. }
        ));
        assert!(matches!(&program.body[3].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn comprehensions_and_slices() {
        let program = parse(
            "dp = [[0] * (m + 1) for _ in range(n + 1)]\nd = {k: v for k, v in pairs if v}\ns = a[1:-1]\nt = a[::2]\n",
        );
        let values: Vec<&Expr> = program
            .body
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Assign { value, .. } => value,
                _ => panic!("expected assignment"),
            })
            .collect();
        assert!(matches!(values[0], Expr::ListComp { .. }));
        assert!(matches!(values[1], Expr::DictComp { condition: Some(_), .. }));
        assert!(matches!(
            values[2],
            Expr::Subscript { index, .. } if matches!(**index, Expr::Slice { step: None, .. })
        ));
        assert!(matches!(
            values[3],
            Expr::Subscript { index, .. } if matches!(**index, Expr::Slice { lower: None, upper: None, step: Some(_) })
        ));
    }

    #[test]
    fn for_loop_with_tuple_target() {
        let program = parse("for i, (a, b) in enumerate(pairs):\n    pass\n");
        let StmtKind::For { target, .. } = &program.body[0].kind else {
            panic!("expected for loop");
        };
        let Target::Tuple(items) = target else {
            panic!("expected tuple target");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Target::Tuple(_)));
    }

    #[test]
    fn if_elif_else_chain() {
        let program = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let StmtKind::If { branches, orelse } = &program.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn single_line_blocks_and_semicolons() {
        let program = parse("if x: y = 1; z = 2\nwhile False: pass\n");
        let StmtKind::If { branches, .. } = &program.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 2);
    }

    #[test]
    fn imports() {
        let program = parse("import sys\nfrom collections import deque, defaultdict as dd\n");
        assert!(matches!(&program.body[0].kind, StmtKind::Import { module, names, .. } if module == "sys" && names.is_empty()));
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::Import { names, .. } if names.len() == 2 && names[1].1.as_deref() == Some("dd")
        ));
    }

    #[test]
    fn keyword_arguments_and_generator_argument() {
        let expr = only_expr("print(sum(x * x for x in xs), end='')\n");
        let Expr::Call { args, kwargs, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(kwargs.len(), 1);
        assert!(matches!(&args[0], Expr::Call { args, .. } if matches!(args[0], Expr::ListComp { .. })));
    }

    #[test]
    fn fstring_placeholders() {
        let expr = only_expr("f\"{name}: {value:.2f} {{literal}}\"\n");
        let Expr::FString(parts) = expr else {
            panic!("expected f-string");
        };
        assert!(matches!(&parts[0], FStringPart::Expr(Expr::Name(n), None) if n == "name"));
        assert!(matches!(&parts[2], FStringPart::Expr(_, Some(spec)) if spec == ".2f"));
        assert!(matches!(&parts[3], FStringPart::Literal(s) if s == " {literal}"));
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse_program("x = (1,\ny = 2\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_program("def f(:\n    pass\n").unwrap_err();
        assert_eq!((err.line, err.column), (1, 7));

        let err = parse_program("f = lambda x: x\n").unwrap_err();
        assert!(err.message.contains("lambda"));

        let err = parse_program("1 = x\n").unwrap_err();
        assert!(err.message.contains("cannot assign"));
    }

    #[test]
    fn block_requires_indentation() {
        let err = parse_program("def f():\nreturn 1\n").unwrap_err();
        assert!(err.message.contains("indented block"));
    }
}
