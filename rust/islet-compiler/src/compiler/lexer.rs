//! Indentation-aware lexer for interpreter source code.

use crate::compiler::tokens::{Span, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unterminated string at line {line}, col {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("unindent does not match any outer indentation level at line {line}")]
    InconsistentIndent { line: usize },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: usize, col: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnexpectedChar { line, .. }
            | LexError::UnterminatedString { line, .. }
            | LexError::InconsistentIndent { line }
            | LexError::InvalidNumber { line, .. } => *line,
        }
    }
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
    indent_stack: Vec<usize>,
    pending: Vec<Token>,
    at_line_start: bool,
    /// Open `(`, `[` and `{` count; newlines inside brackets join lines.
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0, line: 1, col: 1, byte_offset: 0,
            indent_stack: vec![0],
            pending: Vec::new(),
            at_line_start: true,
            depth: 0,
        }
    }

    fn current(&self) -> Option<char> { self.source.get(self.pos).copied() }
    fn peek(&self) -> Option<char> { self.source.get(self.pos + 1).copied() }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' { self.line += 1; self.col = 1; self.at_line_start = true; }
        else { self.col += 1; }
        Some(ch)
    }

    fn span_here(&self) -> Span {
        Span::new(self.byte_offset, self.byte_offset, self.line, self.col)
    }

    fn span_from(&self, so: usize, sl: usize, sc: usize) -> Span {
        Span::new(so, self.byte_offset, sl, sc)
    }

    fn handle_indentation(&mut self) -> Result<(), LexError> {
        let mut indent = 0;
        while let Some(ch) = self.current() {
            match ch {
                ' ' => { indent += 1; self.advance(); }
                '\t' => { indent = (indent / 8 + 1) * 8; self.advance(); }
                '\r' | '\x0c' => { self.advance(); }
                _ => break,
            }
        }
        // Blank and comment-only lines never open or close blocks.
        if matches!(self.current(), None | Some('\n') | Some('#')) {
            return Ok(());
        }
        let cur = self.indent_stack.last().copied().unwrap_or(0);
        if indent > cur {
            self.indent_stack.push(indent);
            self.pending.push(Token::new(TokenKind::Indent, self.span_here()));
        } else if indent < cur {
            while let Some(&top) = self.indent_stack.last() {
                if top > indent { self.indent_stack.pop(); self.pending.push(Token::new(TokenKind::Dedent, self.span_here())); }
                else { break; }
            }
            if self.indent_stack.last().copied().unwrap_or(0) != indent {
                return Err(LexError::InconsistentIndent { line: self.line });
            }
        }
        Ok(())
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => { s.push('\n'); self.advance(); }
                        Some('t') => { s.push('\t'); self.advance(); }
                        Some('r') => { s.push('\r'); self.advance(); }
                        Some('0') => { s.push('\0'); self.advance(); }
                        Some('\\') => { s.push('\\'); self.advance(); }
                        Some('\'') => { s.push('\''); self.advance(); }
                        Some('"') => { s.push('"'); self.advance(); }
                        Some('\n') => { self.advance(); self.at_line_start = false; }
                        Some(c) => { s.push('\\'); s.push(c); self.advance(); }
                        None => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                    }
                }
                Some(c) if c == quote => { self.advance(); break; }
                Some(c) => { s.push(c); self.advance(); }
            }
        }
        Ok(Token::new(TokenKind::StringLit(s), self.span_from(so, sl, sc)))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let mut ns = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() { ns.push(ch); self.advance(); }
            else if ch == '.' && !is_float && matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                is_float = true; ns.push(ch); self.advance();
            }
            else if (ch == 'e' || ch == 'E') && matches!(self.peek(), Some(d) if d.is_ascii_digit() || d == '-' || d == '+') {
                is_float = true; ns.push(ch); self.advance();
                if let Some(sign @ ('-' | '+')) = self.current() { ns.push(sign); self.advance(); }
            }
            else if ch == '_' { self.advance(); }
            else { break; }
        }
        let span = self.span_from(so, sl, sc);
        if is_float {
            ns.parse::<f64>().map(|f| Token::new(TokenKind::FloatLit(f), span))
                .map_err(|_| LexError::InvalidNumber { line: sl, col: sc })
        } else {
            ns.parse::<i64>().map(|n| Token::new(TokenKind::IntLit(n), span))
                .map_err(|_| LexError::InvalidNumber { line: sl, col: sc })
        }
    }

    fn read_ident(&mut self) -> Token {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let mut id = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' { id.push(ch); self.advance(); } else { break; }
        }
        let span = self.span_from(so, sl, sc);
        let kind = TokenKind::keyword(&id).unwrap_or(TokenKind::Ident(id));
        Token::new(kind, span)
    }

    /// `op` alone, or `op=` as the assignment form.
    fn with_assign(&mut self, plain: TokenKind, assign: TokenKind) -> Token {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        self.advance();
        if self.current() == Some('=') { self.advance(); Token::new(assign, self.span_from(so, sl, sc)) }
        else { Token::new(plain, self.span_from(so, sl, sc)) }
    }

    /// `op`, `opop`, `op=` and `opop=` (for `*` / `**` and `/` / `//`).
    fn doubled(&mut self, ch: char, kinds: [TokenKind; 4]) -> Token {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let [single, single_assign, double, double_assign] = kinds;
        self.advance();
        let doubled = self.current() == Some(ch);
        if doubled { self.advance(); }
        let assign = self.current() == Some('=');
        if assign { self.advance(); }
        let kind = match (doubled, assign) {
            (false, false) => single,
            (false, true) => single_assign,
            (true, false) => double,
            (true, true) => double_assign,
        };
        Token::new(kind, self.span_from(so, sl, sc))
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        self.advance();
        Token::new(kind, self.span_from(so, sl, sc))
    }

    fn open(&mut self, kind: TokenKind) -> Token {
        self.depth += 1;
        self.single(kind)
    }

    fn close(&mut self, kind: TokenKind) -> Token {
        self.depth = self.depth.saturating_sub(1);
        self.single(kind)
    }

    fn ends_logical_line(tokens: &[Token]) -> bool {
        !matches!(
            tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent) | None
        )
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while self.pos < self.source.len() {
            if self.at_line_start {
                self.at_line_start = false;
                if self.depth == 0 {
                    self.handle_indentation()?;
                    tokens.append(&mut self.pending);
                }
            }
            let ch = match self.current() { Some(c) => c, None => break };
            match ch {
                '\n' => {
                    let span = self.span_here(); self.advance();
                    if self.depth > 0 {
                        self.at_line_start = false;
                    } else if Self::ends_logical_line(&tokens) {
                        tokens.push(Token::new(TokenKind::Newline, span));
                    }
                }
                '\\' if self.peek() == Some('\n') => { self.advance(); self.advance(); self.at_line_start = false; }
                ' ' | '\t' | '\r' | '\x0c' => { while matches!(self.current(), Some(' ' | '\t' | '\r' | '\x0c')) { self.advance(); } }
                '#' => { while matches!(self.current(), Some(c) if c != '\n') { self.advance(); } }
                '"' | '\'' => tokens.push(self.read_string(ch)?),
                '0'..='9' => tokens.push(self.read_number()?),
                c if c.is_alphabetic() || c == '_' => tokens.push(self.read_ident()),
                '+' => tokens.push(self.with_assign(TokenKind::Plus, TokenKind::PlusAssign)),
                '-' => tokens.push(self.with_assign(TokenKind::Minus, TokenKind::MinusAssign)),
                '%' => tokens.push(self.with_assign(TokenKind::Percent, TokenKind::PercentAssign)),
                '*' => tokens.push(self.doubled('*', [TokenKind::Star, TokenKind::StarAssign, TokenKind::DoubleStar, TokenKind::DoubleStarAssign])),
                '/' => tokens.push(self.doubled('/', [TokenKind::Slash, TokenKind::SlashAssign, TokenKind::DoubleSlash, TokenKind::DoubleSlashAssign])),
                '=' => tokens.push(self.with_assign(TokenKind::Assign, TokenKind::Eq)),
                '<' => tokens.push(self.with_assign(TokenKind::Lt, TokenKind::LtEq)),
                '>' => tokens.push(self.with_assign(TokenKind::Gt, TokenKind::GtEq)),
                '!' => {
                    let (so, sl, sc) = (self.byte_offset, self.line, self.col);
                    self.advance();
                    if self.current() == Some('=') { self.advance(); tokens.push(Token::new(TokenKind::NotEq, self.span_from(so, sl, sc))); }
                    else { return Err(LexError::UnexpectedChar { ch: '!', line: sl, col: sc }); }
                }
                '.' => tokens.push(self.single(TokenKind::Dot)),
                ',' => tokens.push(self.single(TokenKind::Comma)),
                ':' => tokens.push(self.single(TokenKind::Colon)),
                ';' => tokens.push(self.single(TokenKind::Semicolon)),
                '(' => tokens.push(self.open(TokenKind::LParen)),
                ')' => tokens.push(self.close(TokenKind::RParen)),
                '[' => tokens.push(self.open(TokenKind::LBracket)),
                ']' => tokens.push(self.close(TokenKind::RBracket)),
                '{' => tokens.push(self.open(TokenKind::LBrace)),
                '}' => tokens.push(self.close(TokenKind::RBrace)),
                _ => return Err(LexError::UnexpectedChar { ch, line: self.line, col: self.col }),
            }
        }
        if Self::ends_logical_line(&tokens) {
            tokens.push(Token::new(TokenKind::Newline, self.span_here()));
        }
        while self.indent_stack.len() > 1 { self.indent_stack.pop(); tokens.push(Token::new(TokenKind::Dedent, self.span_here())); }
        tokens.push(Token::new(TokenKind::Eof, self.span_here()));
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_assignment() {
        assert_eq!(
            kinds("x = 5"),
            vec![TokenKind::Ident("x".into()), TokenKind::Assign, TokenKind::IntLit(5), TokenKind::Newline, TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_operators() {
        let k = kinds("a ** b // c == d != e <= f");
        assert!(k.contains(&TokenKind::DoubleStar));
        assert!(k.contains(&TokenKind::DoubleSlash));
        assert!(k.contains(&TokenKind::Eq));
        assert!(k.contains(&TokenKind::NotEq));
        assert!(k.contains(&TokenKind::LtEq));
    }

    #[test]
    fn test_lex_augmented() {
        let k = kinds("x += 1\ny //= 2\nz *= 3");
        assert!(k.contains(&TokenKind::PlusAssign));
        assert!(k.contains(&TokenKind::DoubleSlashAssign));
        assert!(k.contains(&TokenKind::StarAssign));
    }

    #[test]
    fn test_lex_strings() {
        assert!(matches!(&kinds(r#""hello""#)[0], TokenKind::StringLit(s) if s == "hello"));
        assert!(matches!(&kinds(r"'it\'s'")[0], TokenKind::StringLit(s) if s == "it's"));
        assert!(matches!(&kinds(r#""a\nb""#)[0], TokenKind::StringLit(s) if s == "a\nb"));
    }

    #[test]
    fn test_lex_indent_dedent() {
        let k = kinds("if x:\n    y = 1\nz = 2\n");
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Indent).count(), 1);
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Dedent).count(), 1);
    }

    #[test]
    fn test_lex_dedent_at_eof() {
        let k = kinds("while True:\n    pass");
        let tail: Vec<_> = k.iter().rev().take(3).cloned().collect();
        assert_eq!(tail, vec![TokenKind::Eof, TokenKind::Dedent, TokenKind::Newline]);
    }

    #[test]
    fn test_lex_brackets_join_lines() {
        let k = kinds("xs = [1,\n      2,\n  3]\n");
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
        assert!(!k.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_lex_blank_and_comment_lines() {
        let k = kinds("x = 1\n\n   # note\n\ny = 2\n");
        assert!(!k.contains(&TokenKind::Indent));
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 2);
    }

    #[test]
    fn test_lex_empty_source() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n# only a comment\n"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_lex_float_forms() {
        assert_eq!(kinds("1.5")[0], TokenKind::FloatLit(1.5));
        assert_eq!(kinds("2e3")[0], TokenKind::FloatLit(2000.0));
        assert_eq!(kinds("1_000")[0], TokenKind::IntLit(1000));
    }

    #[test]
    fn test_lex_errors() {
        assert!(matches!(Lexer::new("\"open").tokenize(), Err(LexError::UnterminatedString { .. })));
        assert!(matches!(Lexer::new("x = $").tokenize(), Err(LexError::UnexpectedChar { ch: '$', .. })));
        assert!(matches!(Lexer::new("99999999999999999999").tokenize(), Err(LexError::InvalidNumber { .. })));
        assert!(matches!(
            Lexer::new("if x:\n        a\n    b\n").tokenize(),
            Err(LexError::InconsistentIndent { line: 3 })
        ));
    }
}
