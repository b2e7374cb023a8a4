//! Tokenizer for directive expressions.

use crate::error::{ErrorCode, Result, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // -----------------------------------------------------------------------
    // Literals
    // -----------------------------------------------------------------------
    IntegerLiteral(i64),
    RealLiteral(f64),
    StringLiteral(String),
    True,
    False,
    Null,

    /// An identifier or dotted path, e.g. `order.customerName`.
    Path(String),

    // -----------------------------------------------------------------------
    // Operators & punctuation
    // -----------------------------------------------------------------------
    Bang,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Minus,
    LeftParen,
    RightParen,

    Eof,
}

/// A hand-written expression tokenizer.
pub struct Lexer<'a> {
    source: &'a str,
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            source: input,
            input: input.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire input. The returned vector always ends with
    /// [`Token::Eof`].
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok == Token::Eof;
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

    fn error(&self, code: ErrorCode, detail: String) -> TemplateError {
        TemplateError::expression(code, self.source, detail)
    }

    fn next_token(&mut self) -> Result<Token> {
        while self.peek().map_or(false, |c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }

        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        if ch == b'"' {
            return self.read_string_literal();
        }
        if ch.is_ascii_digit() {
            return self.read_number();
        }
        if ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$' {
            return Ok(self.read_path_or_keyword());
        }
        self.read_operator()
    }

    fn read_string_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // opening "
        let mut s = String::new();
        loop {
            let rest = &self.source[self.pos..];
            let ch = match rest.chars().next() {
                Some(c) => c,
                None => {
                    return Err(self.error(
                        ErrorCode::MalformedLiteral,
                        format!("unterminated string literal starting at {start}"),
                    ));
                }
            };
            self.pos += ch.len_utf8();
            match ch {
                '"' => break,
                '\\' => {
                    let escaped = match self.peek() {
                        Some(b'"') => '"',
                        Some(b'\\') => '\\',
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        other => {
                            return Err(self.error(
                                ErrorCode::MalformedLiteral,
                                format!(
                                    "invalid escape sequence `\\{}`",
                                    other.map_or(String::new(), |c| (c as char).to_string())
                                ),
                            ));
                        }
                    };
                    self.pos += 1;
                    s.push(escaped);
                }
                c => s.push(c),
            }
        }
        Ok(Token::StringLiteral(s))
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut is_real = false;

        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
            is_real = true;
            self.pos += 1;
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if self.peek() == Some(b'e') || self.peek() == Some(b'E') {
            is_real = true;
            self.pos += 1;
            if self.peek() == Some(b'+') || self.peek() == Some(b'-') {
                self.pos += 1;
            }
            if !self.peek().map_or(false, |c| c.is_ascii_digit()) {
                return Err(self.error(
                    ErrorCode::MalformedLiteral,
                    "expected digit after exponent".into(),
                ));
            }
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if self.peek().map_or(false, |c| c.is_ascii_alphabetic() || c == b'_') {
            return Err(self.error(
                ErrorCode::MalformedLiteral,
                format!("invalid numeric literal near offset {start}"),
            ));
        }

        let text = &self.source[start..self.pos];
        if is_real {
            let val: f64 = text.parse().map_err(|_| {
                self.error(ErrorCode::MalformedLiteral, format!("invalid real literal: {text}"))
            })?;
            Ok(Token::RealLiteral(val))
        } else {
            let val: i64 = text.parse().map_err(|_| {
                self.error(ErrorCode::MalformedLiteral, format!("invalid integer literal: {text}"))
            })?;
            Ok(Token::IntegerLiteral(val))
        }
    }

    fn read_path_or_keyword(&mut self) -> Token {
        let start = self.pos;
        loop {
            while self
                .peek()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
            {
                self.pos += 1;
            }
            // A dot continues the path only when another segment follows.
            let continues = self.peek() == Some(b'.')
                && self
                    .peek_at(1)
                    .map_or(false, |c| c.is_ascii_alphabetic() || c == b'_' || c == b'$');
            if !continues {
                break;
            }
            self.pos += 1;
        }
        match &self.source[start..self.pos] {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            word => Token::Path(word.to_string()),
        }
    }

    fn read_operator(&mut self) -> Result<Token> {
        let ch = self.input[self.pos];
        let next = self.peek_at(1);
        let (tok, len) = match (ch, next) {
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'!', _) => (Token::Bang, 1),
            (b'<', Some(b'=')) => (Token::LtEq, 2),
            (b'<', _) => (Token::Lt, 1),
            (b'>', Some(b'=')) => (Token::GtEq, 2),
            (b'>', _) => (Token::Gt, 1),
            (b'&', Some(b'&')) => (Token::AndAnd, 2),
            (b'|', Some(b'|')) => (Token::OrOr, 2),
            (b'-', _) => (Token::Minus, 1),
            (b'(', _) => (Token::LeftParen, 1),
            (b')', _) => (Token::RightParen, 1),
            _ => {
                let c = self.source[self.pos..].chars().next().unwrap_or('?');
                return Err(self.error(
                    ErrorCode::ExpressionSyntax,
                    format!("unexpected character '{c}'"),
                ));
            }
        };
        self.pos += len;
        Ok(tok)
    }
}
