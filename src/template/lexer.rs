//! Hand-written tokenizer for two-way SQL templates.
//!
//! The [`Lexer`] splits template text into plain SQL runs and directive
//! markers. Plain SQL is never interpreted beyond what is needed to find
//! directives and clause keywords: quoted strings, quoted identifiers and
//! ordinary comments are passed through as [`TokenKind::Text`].
//!
//! `--elseif` and `--else` are only directives while an `if` block is open;
//! the lexer tracks `%if`/`%end` nesting itself so that elsewhere the same
//! characters stay ordinary line comments.

use crate::error::{ErrorCode, Result, TemplateError};

/// The kind of a template token, with borrowed payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Whitespace, punctuation, numbers, quoted text and ordinary comments.
    Text,
    /// A bare identifier-like word; candidates for clause keywords.
    Word,
    OpenParen,
    CloseParen,
    /// `/*expr*/literal`; `literal` is the dummy value that follows.
    BindVariable { expression: &'a str, literal: &'a str },
    /// `/*#expr*/`
    EmbeddedVariable { expression: &'a str },
    /// `/*%if expr*/`
    If { expression: &'a str },
    /// `--elseif expr--` or `/*%elseif expr*/`
    ElseIf { expression: &'a str },
    /// `--else` or `/*%else*/`
    Else,
    /// `/*%end*/`
    End,
    Eof,
}

/// A token and the exact source text it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub text: &'a str,
    pub offset: usize,
}

/// A hand-written template tokenizer.
///
/// Create one with [`Lexer::new`], then call [`Lexer::tokenize`] to obtain
/// the full token stream (terminated by [`TokenKind::Eof`]).
pub struct Lexer<'a> {
    source: &'a str,
    input: &'a [u8],
    pos: usize,
    /// Number of `%if` blocks currently open.
    if_depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            input: source.as_bytes(),
            pos: 0,
            if_depth: 0,
        }
    }

    /// Tokenize the entire input and return the token list.
    pub fn tokenize(&mut self) -> Result<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    // -- helpers ------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn starts_with(&self, at: usize, pat: &str) -> bool {
        self.input[at..].starts_with(pat.as_bytes())
    }

    fn error(&self, code: ErrorCode, offset: usize, detail: impl Into<String>) -> TemplateError {
        TemplateError::syntax(code, self.source, offset, detail)
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.source[start..self.pos],
            offset: start,
        }
    }

    // -- main scanner -------------------------------------------------------

    fn next_token(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(self.token(TokenKind::Eof, start)),
        };

        if ch == b'/' && self.peek_at(1) == Some(b'*') {
            return self.read_block_comment();
        }
        if ch == b'-' && self.peek_at(1) == Some(b'-') {
            return Ok(self.read_line_comment());
        }
        match ch {
            b'(' => {
                self.pos += 1;
                Ok(self.token(TokenKind::OpenParen, start))
            }
            b')' => {
                self.pos += 1;
                Ok(self.token(TokenKind::CloseParen, start))
            }
            c if is_word_start(c) => {
                self.skip_word();
                Ok(self.token(TokenKind::Word, start))
            }
            _ => self.read_text(),
        }
    }

    fn skip_word(&mut self) {
        while self.peek().map_or(false, is_word_part) {
            self.pos += 1;
        }
    }

    /// A run of plain text up to the next word, parenthesis, or comment.
    fn read_text(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            match ch {
                b'\'' | b'"' => self.skip_quoted(ch)?,
                b'(' | b')' => break,
                b'/' if self.peek_at(1) == Some(b'*') => break,
                b'-' if self.peek_at(1) == Some(b'-') => break,
                c if is_word_start(c) => break,
                _ => self.pos += 1,
            }
        }
        Ok(self.token(TokenKind::Text, start))
    }

    /// Skip a `'...'` literal or `"..."` identifier; a doubled quote escapes
    /// itself.
    fn skip_quoted(&mut self, quote: u8) -> Result<()> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(
                        ErrorCode::UnterminatedStringLiteral,
                        start,
                        "unterminated quoted literal",
                    ));
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    if self.peek() == Some(quote) {
                        self.pos += 1;
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    // -- comments and directives -------------------------------------------

    fn read_block_comment(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let body_start = start + 2;
        let close = match find(&self.input[body_start..], b"*/") {
            Some(i) => body_start + i,
            None => {
                return Err(self.error(
                    ErrorCode::UnterminatedBlockComment,
                    start,
                    "block comment is never closed",
                ));
            }
        };
        let body = &self.source[body_start..close];
        self.pos = close + 2;

        match body.as_bytes().first().copied() {
            Some(b'%') => self.read_directive(start, &body[1..]),
            Some(b'#') => {
                let expression = body[1..].trim();
                if expression.is_empty() {
                    return Err(self.error(
                        ErrorCode::EmptyVariableName,
                        start,
                        "embedded variable marker has no expression",
                    ));
                }
                Ok(self.token(TokenKind::EmbeddedVariable { expression }, start))
            }
            Some(c) if is_word_start(c) => {
                let expression = body.trim();
                let literal = self.read_bind_literal(start)?;
                Ok(self.token(TokenKind::BindVariable { expression, literal }, start))
            }
            _ => Ok(self.token(TokenKind::Text, start)),
        }
    }

    fn read_directive(&mut self, start: usize, body: &'a str) -> Result<Token<'a>> {
        let keyword_len = body
            .bytes()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        let (keyword, rest) = body.split_at(keyword_len);
        let rest = rest.trim();
        let kind = match keyword {
            "if" => {
                self.if_depth += 1;
                TokenKind::If { expression: rest }
            }
            "elseif" => TokenKind::ElseIf { expression: rest },
            "else" if rest.is_empty() => TokenKind::Else,
            "end" if rest.is_empty() => {
                self.if_depth = self.if_depth.saturating_sub(1);
                TokenKind::End
            }
            "else" | "end" => {
                return Err(self.error(
                    ErrorCode::UnknownDirective,
                    start,
                    format!("unexpected text after `%{keyword}`: {rest}"),
                ));
            }
            _ => {
                return Err(self.error(
                    ErrorCode::UnknownDirective,
                    start,
                    format!("unrecognized directive `%{}`", body.trim()),
                ));
            }
        };
        Ok(self.token(kind, start))
    }

    /// Read the dummy literal that must directly follow a bind marker.
    fn read_bind_literal(&mut self, marker_start: usize) -> Result<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(b'\'') => {
                self.skip_quoted(b'\'').map_err(|_| {
                    self.error(
                        ErrorCode::UnterminatedBindLiteral,
                        start,
                        "test literal after bind variable is not closed",
                    )
                })?;
            }
            Some(b'(') => self.skip_parenthesized(start)?,
            Some(c) if c.is_ascii_digit() || c == b'.' || c == b'-' || c == b'+' => {
                self.skip_number(marker_start)?;
            }
            Some(c) if is_word_start(c) => self.skip_word(),
            _ => {
                return Err(self.error(
                    ErrorCode::MissingBindLiteral,
                    marker_start,
                    "bind variable must be immediately followed by a test literal",
                ));
            }
        }
        Ok(&self.source[start..self.pos])
    }

    fn skip_parenthesized(&mut self, start: usize) -> Result<()> {
        let mut depth = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                b'\'' | b'"' => {
                    self.skip_quoted(ch).map_err(|_| {
                        self.error(
                            ErrorCode::UnterminatedBindLiteral,
                            start,
                            "quoted value in test literal list is not closed",
                        )
                    })?;
                    continue;
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error(
            ErrorCode::UnterminatedBindLiteral,
            start,
            "test literal list is not closed",
        ))
    }

    fn skip_number(&mut self, marker_start: usize) -> Result<()> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-') | Some(b'+')) {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let mantissa = &self.input[digits_start..self.pos];
        if !mantissa.iter().any(u8::is_ascii_digit) {
            self.pos = start;
            return Err(self.error(
                ErrorCode::MissingBindLiteral,
                marker_start,
                "bind variable must be immediately followed by a test literal",
            ));
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'-') | Some(b'+')) {
                self.pos += 1;
            }
            if self.peek().map_or(false, |c| c.is_ascii_digit()) {
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        Ok(())
    }

    /// Handle `--`: a continuation directive inside an open `if` block,
    /// otherwise an ordinary comment running to the end of the line.
    fn read_line_comment(&mut self) -> Token<'a> {
        let start = self.pos;
        let after = start + 2;

        if self.if_depth > 0 {
            if self.starts_with(after, "elseif") && !self.is_word_part_at(after + 6) {
                let expr_start = after + 6;
                let (expr_end, next) = self.scan_elseif_expression(expr_start);
                self.pos = next;
                let expression = self.source[expr_start..expr_end].trim();
                return self.token(TokenKind::ElseIf { expression }, start);
            }
            if self.starts_with(after, "else") && !self.is_word_part_at(after + 4) {
                self.pos = after + 4;
                return self.token(TokenKind::Else, start);
            }
        }

        self.pos = after;
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.pos += 1;
        }
        self.token(TokenKind::Text, start)
    }

    /// Find the end of an `--elseif` expression: the next `--` outside a
    /// double-quoted string (consumed), or the end of the line (kept).
    /// Returns `(expression_end, resume_position)`.
    fn scan_elseif_expression(&self, from: usize) -> (usize, usize) {
        let mut i = from;
        let mut in_string = false;
        while i < self.input.len() {
            let c = self.input[i];
            if in_string {
                if c == b'\\' {
                    i += 1;
                } else if c == b'"' {
                    in_string = false;
                }
            } else if c == b'"' {
                in_string = true;
            } else if c == b'\n' {
                return (i, i);
            } else if c == b'-' && self.input.get(i + 1) == Some(&b'-') {
                return (i, i + 2);
            }
            i += 1;
        }
        let end = self.input.len();
        (end, end)
    }

    fn is_word_part_at(&self, at: usize) -> bool {
        self.input.get(at).copied().map_or(false, is_word_part)
    }
}

fn is_word_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_word_part(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ===========================================================================
// Tests
// ===========================================================================
