//! Indentation-aware lexer.
//!
//! Converts source text into a flat token stream. Leading whitespace at the
//! start of each logical line is turned into `Indent`/`Dedent` tokens, blank
//! and comment-only lines are skipped, and newlines inside brackets are
//! ignored so expressions may span lines.

use crate::error::SyntaxError;
use crate::span::Span;
use crate::token::{Token, TokenKind};

const TAB_WIDTH: usize = 4;

/// Tokenizes `source` into a vector ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    indents: Vec<usize>,
    depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token { kind, span });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        )
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if !self.handle_indentation()? {
                    break;
                }
                continue;
            }

            let Some(c) = self.peek() else { break };
            let span = self.span();
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    if self.depth == 0 {
                        if !self.last_is_newline() {
                            self.push(TokenKind::Newline, span);
                        }
                        self.at_line_start = true;
                    }
                }
                '0'..='9' => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
                '"' | '\'' => {
                    let body = self.lex_string_body(span, false)?;
                    self.push(TokenKind::Str(body), span);
                }
                c if c.is_alphabetic() || c == '_' => self.lex_name()?,
                '@' => {
                    return Err(SyntaxError::at(span, "decorators are not supported"));
                }
                _ => self.lex_operator(span)?,
            }
        }

        let end = self.span();
        if !self.last_is_newline() {
            self.push(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    /// Measures leading whitespace and emits layout tokens. Returns `false`
    /// once the input is exhausted.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => return Ok(false),
            Some('\n') => {
                self.advance();
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.advance();
                }
                return Ok(true);
            }
            _ => {}
        }

        let span = self.span();
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, span);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, span);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(SyntaxError::at(
                    span,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        self.at_line_start = false;
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let span = self.span();
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '_' {
                // digit separator
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                is_float = true;
                text.push(c);
                self.advance();
                if let Some(sign) = self.peek().filter(|s| *s == '-' || *s == '+') {
                    text.push(sign);
                    self.advance();
                }
                continue;
            } else {
                break;
            }
            self.advance();
        }

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| SyntaxError::at(span, format!("invalid number literal '{}'", text)))?;
            self.push(TokenKind::Float(value), span);
        } else {
            let value = text.parse::<i64>().map_err(|_| {
                SyntaxError::at(span, format!("integer literal '{}' is too large", text))
            })?;
            self.push(TokenKind::Int(value), span);
        }
        Ok(())
    }

    fn lex_name(&mut self) -> Result<(), SyntaxError> {
        let span = self.span();
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // String prefixes: r"..", f"..", rf"..", fr"..", b".." (treated as text).
        if matches!(self.peek(), Some('"') | Some('\'')) {
            let lower = ident.to_ascii_lowercase();
            if matches!(lower.as_str(), "r" | "f" | "b" | "rf" | "fr" | "rb" | "br") {
                let raw = lower.contains('r');
                let body = self.lex_string_body(span, raw)?;
                let kind = if lower.contains('f') {
                    TokenKind::FStr(body)
                } else {
                    TokenKind::Str(body)
                };
                self.push(kind, span);
                return Ok(());
            }
        }

        let kind = TokenKind::keyword(&ident).unwrap_or(TokenKind::Name(ident));
        self.push(kind, span);
        Ok(())
    }

    fn lex_string_body(&mut self, span: Span, raw: bool) -> Result<String, SyntaxError> {
        let quote = self.advance().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut out = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(SyntaxError::at(span, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.advance();
                    self.advance();
                    break;
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(SyntaxError::at(span, "unterminated string literal"));
            }
            if c == '\\' && !raw {
                let Some(escaped) = self.advance() else {
                    return Err(SyntaxError::at(span, "unterminated string literal"));
                };
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => {}
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
        }
        Ok(out)
    }

    fn lex_operator(&mut self, span: Span) -> Result<(), SyntaxError> {
        let c = self.peek().unwrap_or('\0');
        let next = self.peek_at(1);
        let third = self.peek_at(2);

        let (kind, len) = match (c, next, third) {
            ('/', Some('/'), Some('=')) => (TokenKind::DoubleSlashAssign, 3),
            ('*', Some('*'), _) => (TokenKind::DoubleStar, 2),
            ('/', Some('/'), _) => (TokenKind::DoubleSlash, 2),
            ('=', Some('='), _) => (TokenKind::EqEq, 2),
            ('!', Some('='), _) => (TokenKind::NotEq, 2),
            ('<', Some('='), _) => (TokenKind::LtE, 2),
            ('>', Some('='), _) => (TokenKind::GtE, 2),
            ('+', Some('='), _) => (TokenKind::PlusAssign, 2),
            ('-', Some('='), _) => (TokenKind::MinusAssign, 2),
            ('*', Some('='), _) => (TokenKind::StarAssign, 2),
            ('/', Some('='), _) => (TokenKind::SlashAssign, 2),
            ('%', Some('='), _) => (TokenKind::PercentAssign, 2),
            ('-', Some('>'), _) => (TokenKind::Arrow, 2),
            ('(', _, _) => (TokenKind::LParen, 1),
            (')', _, _) => (TokenKind::RParen, 1),
            ('[', _, _) => (TokenKind::LBracket, 1),
            (']', _, _) => (TokenKind::RBracket, 1),
            ('{', _, _) => (TokenKind::LBrace, 1),
            ('}', _, _) => (TokenKind::RBrace, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            (':', _, _) => (TokenKind::Colon, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            ('.', _, _) => (TokenKind::Dot, 1),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('=', _, _) => (TokenKind::Assign, 1),
            ('<', _, _) => (TokenKind::Lt, 1),
            ('>', _, _) => (TokenKind::Gt, 1),
            _ => {
                return Err(SyntaxError::at(
                    span,
                    format!("unexpected character '{}'", c),
                ))
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }

        for _ in 0..len {
            self.advance();
        }
        self.push(kind, span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn indentation_produces_layout_tokens() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::If,
                TokenKind::Name("x".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("y".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("z".into()),
                TokenKind::Assign,
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let toks = kinds("# header\n\nx = 1  # trailing\n\n   # indented comment\ny = 2\n");
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!toks.contains(&TokenKind::Indent));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("graph = {\n  'a': ['b'],\n  'b': []\n}\n");
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn dedent_to_unknown_level_is_an_error() {
        let err = tokenize("if x:\n        y = 1\n    z = 2\n").unwrap_err();
        assert!(err.message.contains("unindent"), "{}", err);
        assert_eq!(err.line, 3);
    }

    #[test]
    fn numbers_and_strings() {
        let toks = kinds("a = 1_000 + 2.5e1 - .5\nb = 'it\\'s' + f\"{a}\"\n");
        assert!(toks.contains(&TokenKind::Int(1000)));
        assert!(toks.contains(&TokenKind::Float(25.0)));
        assert!(toks.contains(&TokenKind::Float(0.5)));
        assert!(toks.contains(&TokenKind::Str("it's".into())));
        assert!(toks.contains(&TokenKind::FStr("{a}".into())));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let toks = kinds("def f():\n    \"\"\"doc\n    more\"\"\"\n    return 1\n");
        assert!(toks.contains(&TokenKind::Str("doc\n    more".into())));
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = tokenize("x = 1\ny = $\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 5));
    }
}
