//! PDF tokenizer.

use crate::error::{PdfError, Result};
use crate::model::Name;

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Real(f64),
    Bool(bool),
    /// Name without the leading slash, `#xx` escapes resolved.
    Name(Name),
    /// Literal or hex string bytes.
    String(Vec<u8>),
    /// Bare keyword, including `[`, `]`, `<<` and `>>`.
    Keyword(Vec<u8>),
}

impl Token {
    pub fn is_keyword(&self, kw: &[u8]) -> bool {
        matches!(self, Self::Keyword(k) if k == kw)
    }
}

pub(crate) const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub(crate) const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Byte-slice tokenizer with an explicit cursor.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Lexer positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    pub const fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.advance() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn lex_name(&mut self) -> Token {
        self.pos += 1;
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let escaped = self
                    .peek()
                    .and_then(hex_value)
                    .zip(self.peek_at(1).and_then(hex_value));
                if let Some((hi, lo)) = escaped {
                    self.pos += 2;
                    name.push(hi << 4 | lo);
                }
                // A malformed escape drops the '#' and keeps what follows.
                continue;
            }
            name.push(b);
        }

        Token::Name(Name::new(String::from_utf8_lossy(&name)))
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| PdfError::malformed(start, "invalid number"))?;
        if has_dot {
            // "5." and "-.5" are valid PDF reals.
            let normalized = text.trim_end_matches('.');
            let value = match normalized {
                "" | "+" | "-" => 0.0,
                n => n
                    .parse::<f64>()
                    .map_err(|_| PdfError::malformed(start, format!("invalid real: {text}")))?,
            };
            Ok(Token::Real(value))
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out of range integers degrade to reals.
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| PdfError::malformed(start, format!("invalid integer: {text}"))),
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            let Some(b) = self.advance() else {
                return Err(PdfError::malformed(start, "unterminated string"));
            };
            match b {
                b'(' => {
                    depth += 1;
                    result.push(b'(');
                }
                b')' => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                b'\\' => {
                    let Some(escaped) = self.advance() else {
                        return Err(PdfError::malformed(start, "unterminated string"));
                    };
                    match escaped {
                        b'n' => result.push(b'\n'),
                        b'r' => result.push(b'\r'),
                        b't' => result.push(b'\t'),
                        b'b' => result.push(0x08),
                        b'f' => result.push(0x0c),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut octal = (escaped - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        self.pos += 1;
                                        octal = octal * 8 + (d - b'0') as u32;
                                    }
                                    _ => break,
                                }
                            }
                            result.push((octal & 0xff) as u8);
                        }
                        other => result.push(other),
                    }
                }
                other => result.push(other),
            }
        }

        Ok(Token::String(result))
    }

    fn lex_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) => {
                    let Some(nibble) = hex_value(c) else {
                        if is_whitespace(c) {
                            continue;
                        }
                        return Err(PdfError::malformed(start, "invalid hex string"));
                    };
                    match pending.take() {
                        Some(hi) => result.push(hi << 4 | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::malformed(start, "unterminated hex string")),
            }
        }
        if let Some(hi) = pending {
            result.push(hi << 4);
        }

        Ok(Token::String(result))
    }

    fn lex_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // Stray delimiter such as ')' or '}'.
            self.pos += 1;
        }

        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            kw => Token::Keyword(kw.to_vec()),
        }
    }

    /// Next token with its starting offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek()?;

        let token = match b {
            b'/' => Ok(self.lex_name()),
            b'(' => self.lex_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Ok(Token::Keyword(b"<<".to_vec()))
            }
            b'<' => self.lex_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Ok(Token::Keyword(b">>".to_vec()))
            }
            b'[' | b']' | b'{' | b'}' | b'>' => {
                self.pos += 1;
                Ok(Token::Keyword(vec![b]))
            }
            b'+' | b'-' | b'.'
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') =>
            {
                self.lex_number()
            }
            c if c.is_ascii_digit() => self.lex_number(),
            _ => Ok(self.lex_keyword()),
        };

        Some(token.map(|t| (start, t)))
    }
}
