//! Recursive descent parser with Pratt expression parsing.

use crate::compiler::ast::*;
use crate::compiler::tokens::{Span, Token, TokenKind};
use std::sync::Arc;
use thiserror::Error;

/// Deepest nesting of blocks and sub-expressions the parser accepts.
pub const MAX_NESTING: usize = 200;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token {found} at line {line}, col {col}; expected {expected}")]
    Unexpected { found: String, expected: String, line: usize, col: usize },
    #[error("cannot assign to {what} at line {line}, col {col}")]
    InvalidTarget { what: String, line: usize, col: usize },
    #[error("{message} at line {line}, col {col}")]
    Invalid { message: String, line: usize, col: usize },
    #[error("unexpected end of input at line {line}")]
    UnexpectedEof { line: usize },
    #[error("too many nested blocks or expressions at line {line}, col {col} (limit {limit})")]
    TooDeep { limit: usize, line: usize, col: usize },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Unexpected { line, .. }
            | ParseError::InvalidTarget { line, .. }
            | ParseError::Invalid { line, .. }
            | ParseError::UnexpectedEof { line }
            | ParseError::TooDeep { line, .. } => *line,
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let span = tokens.last().map(|t| t.span).unwrap_or_else(Span::dummy);
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self { tokens, pos: 0, depth: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind { &self.current().kind }

    fn peek_ahead(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() { self.pos += 1; }
        &self.tokens[idx]
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.current();
        if matches!(tok.kind, TokenKind::Eof) {
            return ParseError::UnexpectedEof { line: tok.span.line };
        }
        let found = match tok.kind {
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "unexpected dedent".to_string(),
            ref other => format!("{}", other),
        };
        ParseError::Unexpected { found, expected: expected.into(), line: tok.span.line, col: tok.span.col }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        let tok = self.current().clone();
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(kind) {
            self.advance();
            Ok(tok)
        } else {
            Err(self.unexpected(&format!("{}", kind)))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) { self.advance(); }
    }

    fn at_end(&self) -> bool { matches!(self.peek_kind(), TokenKind::Eof) }

    /// Run `f` one nesting level deeper, refusing past [`MAX_NESTING`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            let span = self.current().span;
            return Err(ParseError::TooDeep { limit: MAX_NESTING, line: span.line, col: span.col });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ── Top-level parsing ──

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let span_start = self.current().span;
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.at_end() {
            body.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        let span = match body.last() {
            Some(last) => span_start.merge(last.span()),
            None => span_start,
        };
        Ok(Program { body, span })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        match self.peek_kind() {
            TokenKind::If => Ok(vec![self.parse_if()?]),
            TokenKind::While => Ok(vec![self.parse_while()?]),
            TokenKind::For => Ok(vec![self.parse_for()?]),
            TokenKind::Def => Ok(vec![self.parse_def()?]),
            _ => self.parse_simple_line(),
        }
    }

    /// One or more `;`-separated simple statements terminated by a newline.
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = vec![self.parse_simple()?];
        while matches!(self.peek_kind(), TokenKind::Semicolon) {
            self.advance();
            if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) { break; }
            stmts.push(self.parse_simple()?);
        }
        match self.peek_kind() {
            TokenKind::Newline => { self.advance(); }
            TokenKind::Eof | TokenKind::Dedent => {}
            _ => return Err(self.unexpected("end of line")),
        }
        Ok(stmts)
    }

    /// Indented block after `:`, or a simple statement line on the same line.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.nested(Self::parse_suite)
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !matches!(self.peek_kind(), TokenKind::Newline) {
            return self.parse_simple_line();
        }
        self.advance();
        self.skip_newlines();
        if !matches!(self.peek_kind(), TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        self.advance();
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek_kind(), TokenKind::Dedent | TokenKind::Eof) {
            stmts.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        if matches!(self.peek_kind(), TokenKind::Dedent) { self.advance(); }
        Ok(stmts)
    }

    // ── Compound statements ──

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::If)?.span;
        let mut branches = Vec::new();
        let cond = self.parse_expr(0)?;
        self.expect(&TokenKind::Colon)?;
        branches.push((cond, self.parse_block()?));
        while matches!(self.peek_kind(), TokenKind::Elif) {
            self.advance();
            let cond = self.parse_expr(0)?;
            self.expect(&TokenKind::Colon)?;
            branches.push((cond, self.parse_block()?));
        }
        let else_body = if matches!(self.peek_kind(), TokenKind::Else) {
            self.advance();
            self.expect(&TokenKind::Colon)?;
            Some(self.parse_block()?)
        } else { None };
        let end = else_body.as_ref().and_then(|b| b.last()).map(|s| s.span())
            .or_else(|| branches.last().and_then(|(_, b)| b.last()).map(|s| s.span()))
            .unwrap_or(start);
        Ok(Stmt::If(IfStmt { branches, else_body, span: start.merge(end) }))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::While)?.span;
        let condition = self.parse_expr(0)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::While(WhileStmt { condition, body, span }))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::For)?.span;
        let var = self.expect_ident()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expr(0)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::For(ForStmt { var, iter, body, span }))
    }

    fn parse_def(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::Def)?.span;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RParen) {
            let ps = self.current().span;
            let pname = self.expect_ident()?;
            let default = if matches!(self.peek_kind(), TokenKind::Assign) {
                self.advance();
                Some(self.parse_expr(0)?)
            } else { None };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(ParseError::Invalid {
                    message: "non-default parameter follows default parameter".into(),
                    line: ps.line, col: ps.col,
                });
            }
            params.push(Param { name: pname, default, span: ps });
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::Def(Arc::new(FunctionDef { name, params, body, span })))
    }

    // ── Simple statements ──

    fn parse_simple(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::Pass => Ok(Stmt::Pass(self.advance().span)),
            TokenKind::Break => Ok(Stmt::Break(self.advance().span)),
            TokenKind::Continue => Ok(Stmt::Continue(self.advance().span)),
            TokenKind::Return => {
                let start = self.advance().span;
                let value = if self.at_statement_end() { None } else { Some(self.parse_expr(0)?) };
                let span = value.as_ref().map(|v| start.merge(v.span())).unwrap_or(start);
                Ok(Stmt::Return(ReturnStmt { value, span }))
            }
            TokenKind::Raise => {
                let start = self.advance().span;
                let value = if self.at_statement_end() { None } else { Some(self.parse_expr(0)?) };
                let span = value.as_ref().map(|v| start.merge(v.span())).unwrap_or(start);
                Ok(Stmt::Raise(RaiseStmt { value, span }))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_from_import(),
            TokenKind::Global => {
                let start = self.advance().span;
                let mut names = vec![self.expect_ident()?];
                while matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                    names.push(self.expect_ident()?);
                }
                Ok(Stmt::Global(GlobalStmt { names, span: start }))
            }
            _ => self.parse_expr_or_assign(),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof | TokenKind::Dedent)
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::Import)?.span;
        let mut names = Vec::new();
        loop {
            let module = self.expect_ident()?;
            let alias = self.parse_alias()?;
            names.push((module, alias));
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        Ok(Stmt::Import(ImportStmt { names, span: start }))
    }

    fn parse_from_import(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(&TokenKind::From)?.span;
        let module = self.expect_ident()?;
        self.expect(&TokenKind::Import)?;
        let mut names = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let alias = self.parse_alias()?;
            names.push((name, alias));
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        Ok(Stmt::FromImport(FromImportStmt { module, names, span: start }))
    }

    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if matches!(self.peek_kind(), TokenKind::As) {
            self.advance();
            Ok(Some(self.expect_ident()?))
        } else { Ok(None) }
    }

    fn parse_expr_or_assign(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expr(0)?;
        let start = expr.span();
        if matches!(self.peek_kind(), TokenKind::Assign) {
            let mut targets = vec![Self::to_target(expr)?];
            loop {
                self.advance();
                let rhs = self.parse_expr(0)?;
                if matches!(self.peek_kind(), TokenKind::Assign) {
                    targets.push(Self::to_target(rhs)?);
                } else {
                    let span = start.merge(rhs.span());
                    return Ok(Stmt::Assign(AssignStmt { targets, value: rhs, span }));
                }
            }
        }
        if self.peek_kind().is_augmented_assign() {
            let op = match self.advance().kind {
                TokenKind::PlusAssign => BinOp::Add,
                TokenKind::MinusAssign => BinOp::Sub,
                TokenKind::StarAssign => BinOp::Mul,
                TokenKind::SlashAssign => BinOp::Div,
                TokenKind::DoubleSlashAssign => BinOp::FloorDiv,
                TokenKind::DoubleStarAssign => BinOp::Pow,
                _ => BinOp::Mod,
            };
            let target = Self::to_target(expr)?;
            let value = self.parse_expr(0)?;
            let span = start.merge(value.span());
            return Ok(Stmt::AugAssign(AugAssignStmt { target, op, value, span }));
        }
        Ok(Stmt::Expr(ExprStmt { expr, span: start }))
    }

    fn to_target(expr: Expr) -> Result<Target, ParseError> {
        match expr {
            Expr::Ident(name, span) => Ok(Target::Name(name, span)),
            Expr::Index(base, index, span) => {
                if base.root_name().is_none() {
                    return Err(ParseError::InvalidTarget { what: "a subscript of an expression".into(), line: span.line, col: span.col });
                }
                Ok(Target::Index(base, index, span))
            }
            other => {
                let what = match &other {
                    Expr::Attribute(..) => "attribute",
                    Expr::Call(..) => "function call",
                    Expr::IntLit(..) | Expr::FloatLit(..) | Expr::StringLit(..)
                    | Expr::BoolLit(..) | Expr::NoneLit(..) => "literal",
                    _ => "expression",
                };
                let span = other.span();
                Err(ParseError::InvalidTarget { what: what.into(), line: span.line, col: span.col })
            }
        }
    }

    // ── Expressions (Pratt parser) ──
    //
    // Every expression parser also returns the height of the tree it built,
    // so left-leaning chains like `a + b + c + ...` count against the same
    // nesting limit as parentheses and brackets.

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        Ok(self.parse_tree(min_bp)?.0)
    }

    fn parse_tree(&mut self, min_bp: u8) -> Result<(Expr, usize), ParseError> {
        self.nested(|p| p.parse_binding(min_bp))
    }

    /// Height of a node over children of height `child`, within the nesting limit.
    fn grow(&self, child: usize) -> Result<usize, ParseError> {
        let height = child + 1;
        if self.depth + height > MAX_NESTING {
            let span = self.current().span;
            return Err(ParseError::TooDeep { limit: MAX_NESTING, line: span.line, col: span.col });
        }
        Ok(height)
    }

    fn parse_binding(&mut self, min_bp: u8) -> Result<(Expr, usize), ParseError> {
        let (mut lhs, mut height) = self.parse_prefix()?;
        loop {
            let (op, bp) = match self.peek_kind() {
                TokenKind::Or => (BinOp::Or, (2, 3)),
                TokenKind::And => (BinOp::And, (4, 5)),
                TokenKind::Eq => (BinOp::Eq, (8, 9)),
                TokenKind::NotEq => (BinOp::NotEq, (8, 9)),
                TokenKind::Lt => (BinOp::Lt, (8, 9)),
                TokenKind::LtEq => (BinOp::LtEq, (8, 9)),
                TokenKind::Gt => (BinOp::Gt, (8, 9)),
                TokenKind::GtEq => (BinOp::GtEq, (8, 9)),
                TokenKind::In => (BinOp::In, (8, 9)),
                TokenKind::Not if matches!(self.peek_ahead(1), TokenKind::In) => {
                    if 8 < min_bp { break; }
                    self.advance();
                    self.advance();
                    let (rhs, rh) = self.parse_tree(9)?;
                    height = self.grow(height.max(rh))?;
                    let span = lhs.span().merge(rhs.span());
                    lhs = Expr::BinOp(Box::new(lhs), BinOp::NotIn, Box::new(rhs), span);
                    continue;
                }
                TokenKind::Plus => (BinOp::Add, (10, 11)),
                TokenKind::Minus => (BinOp::Sub, (10, 11)),
                TokenKind::Star => (BinOp::Mul, (12, 13)),
                TokenKind::Slash => (BinOp::Div, (12, 13)),
                TokenKind::DoubleSlash => (BinOp::FloorDiv, (12, 13)),
                TokenKind::Percent => (BinOp::Mod, (12, 13)),
                // Right-associative
                TokenKind::DoubleStar => (BinOp::Pow, (16, 15)),
                // Postfix: attribute, index, call
                TokenKind::Dot => {
                    if min_bp > 18 { break; }
                    self.advance();
                    let field = self.expect_ident()?;
                    height = self.grow(height)?;
                    let span = lhs.span().merge(self.current().span);
                    lhs = Expr::Attribute(Box::new(lhs), field, span);
                    continue;
                }
                TokenKind::LBracket => {
                    if min_bp > 18 { break; }
                    self.advance();
                    let (idx, ih) = self.parse_tree(0)?;
                    let end = self.expect(&TokenKind::RBracket)?.span;
                    height = self.grow(height.max(ih))?;
                    let span = lhs.span().merge(end);
                    lhs = Expr::Index(Box::new(lhs), Box::new(idx), span);
                    continue;
                }
                TokenKind::LParen => {
                    if min_bp > 18 { break; }
                    (lhs, height) = self.parse_call(lhs, height)?;
                    continue;
                }
                // `body if cond else orelse` binds loosest of all
                TokenKind::If => {
                    if min_bp > 1 { break; }
                    self.advance();
                    let (cond, ch) = self.parse_tree(2)?;
                    self.expect(&TokenKind::Else)?;
                    let (orelse, oh) = self.parse_tree(1)?;
                    height = self.grow(height.max(ch).max(oh))?;
                    let span = lhs.span().merge(orelse.span());
                    lhs = Expr::IfExpr(Box::new(cond), Box::new(lhs), Box::new(orelse), span);
                    continue;
                }
                _ => break,
            };
            let (l_bp, r_bp) = bp;
            if l_bp < min_bp { break; }
            self.advance();
            let (rhs, rh) = self.parse_tree(r_bp)?;
            height = self.grow(height.max(rh))?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs), span);
        }
        Ok((lhs, height))
    }

    fn parse_prefix(&mut self) -> Result<(Expr, usize), ParseError> {
        let leaf = match self.peek_kind().clone() {
            TokenKind::IntLit(n) => { let s = self.advance().span; Expr::IntLit(n, s) }
            TokenKind::FloatLit(n) => { let s = self.advance().span; Expr::FloatLit(n, s) }
            TokenKind::StringLit(sv) => {
                let mut s = self.advance().span;
                let mut value = sv;
                // Adjacent string literals concatenate
                while let TokenKind::StringLit(next) = self.peek_kind().clone() {
                    value.push_str(&next);
                    s = s.merge(self.advance().span);
                }
                Expr::StringLit(value, s)
            }
            TokenKind::True_ => { let s = self.advance().span; Expr::BoolLit(true, s) }
            TokenKind::False_ => { let s = self.advance().span; Expr::BoolLit(false, s) }
            TokenKind::None_ => { let s = self.advance().span; Expr::NoneLit(s) }
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Expr::Ident(name, span)
            }
            TokenKind::Minus => return self.parse_unary(UnaryOp::Neg, 14),
            TokenKind::Plus => return self.parse_unary(UnaryOp::Pos, 14),
            TokenKind::Not => return self.parse_unary(UnaryOp::Not, 7),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_tree(0)?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => return self.parse_list_lit(),
            TokenKind::LBrace => return self.parse_dict_lit(),
            _ => return Err(self.unexpected("expression")),
        };
        Ok((leaf, 1))
    }

    fn parse_unary(&mut self, op: UnaryOp, bp: u8) -> Result<(Expr, usize), ParseError> {
        let s = self.advance().span;
        let (expr, h) = self.parse_tree(bp)?;
        let height = self.grow(h)?;
        let span = s.merge(expr.span());
        Ok((Expr::UnaryOp(op, Box::new(expr), span), height))
    }

    fn parse_call(&mut self, callee: Expr, callee_height: usize) -> Result<(Expr, usize), ParseError> {
        let start = callee.span();
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        let mut tallest = callee_height;
        let mut seen_keyword = false;
        while !matches!(self.peek_kind(), TokenKind::RParen) {
            if let (TokenKind::Ident(name), TokenKind::Assign) = (self.peek_kind().clone(), self.peek_ahead(1)) {
                let ks = self.advance().span;
                self.advance();
                let (val, h) = self.parse_tree(0)?;
                tallest = tallest.max(h);
                seen_keyword = true;
                args.push(CallArg::Keyword(name, val, ks));
            } else {
                let (expr, h) = self.parse_tree(0)?;
                if seen_keyword {
                    let span = expr.span();
                    return Err(ParseError::Invalid {
                        message: "positional argument follows keyword argument".into(),
                        line: span.line, col: span.col,
                    });
                }
                tallest = tallest.max(h);
                args.push(CallArg::Positional(expr));
            }
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        let end = self.expect(&TokenKind::RParen)?.span;
        let height = self.grow(tallest)?;
        Ok((Expr::Call(Box::new(callee), args, start.merge(end)), height))
    }

    fn parse_list_lit(&mut self) -> Result<(Expr, usize), ParseError> {
        let start = self.expect(&TokenKind::LBracket)?.span;
        let mut elems = Vec::new();
        let mut tallest = 0;
        while !matches!(self.peek_kind(), TokenKind::RBracket) {
            let (elem, h) = self.parse_tree(0)?;
            tallest = tallest.max(h);
            elems.push(elem);
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        let end = self.expect(&TokenKind::RBracket)?.span;
        let height = self.grow(tallest)?;
        Ok((Expr::ListLit(elems, start.merge(end)), height))
    }

    fn parse_dict_lit(&mut self) -> Result<(Expr, usize), ParseError> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut pairs = Vec::new();
        let mut tallest = 0;
        while !matches!(self.peek_kind(), TokenKind::RBrace) {
            let (key, kh) = self.parse_tree(0)?;
            self.expect(&TokenKind::Colon)?;
            let (val, vh) = self.parse_tree(0)?;
            tallest = tallest.max(kh).max(vh);
            pairs.push((key, val));
            if matches!(self.peek_kind(), TokenKind::Comma) { self.advance(); } else { break; }
        }
        let end = self.expect(&TokenKind::RBrace)?.span;
        let height = self.grow(tallest)?;
        Ok((Expr::DictLit(pairs, start.merge(end)), height))
    }

    // ── Helpers ──

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => { self.advance(); Ok(name) }
            _ => Err(self.unexpected("identifier")),
        }
    }
}
