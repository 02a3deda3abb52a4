//! Object parser: tokens to graph nodes.
//!
//! `n g R` triples become references; everything else maps one to one.

use super::lexer::{Lexer, Token};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, Node, ObjectId};

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 256;

pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Pushed-back tokens, most recent last.
    lookahead: Vec<(usize, Token)>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: Vec::new(),
        }
    }

    /// Offset just past the last consumed token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .iter()
            .map(|(pos, _)| *pos)
            .min()
            .unwrap_or(self.lexer.tell())
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn expect_token(&mut self) -> Result<(usize, Token)> {
        self.next_token()?
            .ok_or_else(|| PdfError::malformed(self.lexer.tell(), "unexpected end of input"))
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Parse the next object.
    pub fn parse_object(&mut self) -> Result<Node> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<Node> {
        let (pos, token) = self.expect_token()?;
        if depth > MAX_DEPTH {
            return Err(PdfError::malformed(pos, "object nesting too deep"));
        }
        match token {
            Token::Integer(n) => Ok(self.integer_or_reference(n)?),
            Token::Real(n) => Ok(Node::Number(n)),
            Token::Bool(b) => Ok(Node::Boolean(b)),
            Token::Name(name) => Ok(Node::Name(name)),
            Token::String(s) => Ok(Node::TextString(s)),
            Token::Keyword(kw) => match kw.as_slice() {
                b"null" => Ok(Node::Null),
                b"[" => self.parse_array(depth),
                b"<<" => self.parse_dict(depth),
                other => Err(PdfError::malformed(
                    pos,
                    format!("unexpected keyword: {}", String::from_utf8_lossy(other)),
                )),
            },
        }
    }

    fn integer_or_reference(&mut self, n: i64) -> Result<Node> {
        let Some(second) = self.next_token()? else {
            return Ok(Node::Number(n as f64));
        };
        if let Token::Integer(generation) = second.1 {
            match self.next_token()? {
                Some((_, Token::Keyword(kw))) if kw == b"R" => {
                    if let (Ok(number), Ok(generation)) =
                        (u32::try_from(n), u16::try_from(generation))
                    {
                        return Ok(Node::Reference(ObjectId::new(number, generation)));
                    }
                    return Ok(Node::Null);
                }
                Some(third) => self.push_back(third),
                None => {}
            }
        }
        self.push_back(second);
        Ok(Node::Number(n as f64))
    }

    fn parse_array(&mut self, depth: usize) -> Result<Node> {
        let mut items = Vec::new();
        loop {
            let tok = self.expect_token()?;
            if tok.1.is_keyword(b"]") {
                break;
            }
            self.push_back(tok);
            items.push(self.parse_nested(depth + 1)?);
        }
        Ok(Node::Array(items))
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Node> {
        let mut dict = Dictionary::new();
        loop {
            let (pos, token) = self.expect_token()?;
            let key = match token {
                Token::Keyword(ref kw) if kw == b">>" => break,
                Token::Name(name) => name,
                _ => return Err(PdfError::malformed(pos, "expected name as dict key")),
            };
            let value = self.parse_nested(depth + 1)?;
            // A null value is the same as an absent key.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        Ok(Node::Dictionary(dict))
    }

    /// Parse an `n g obj` header and return its identity.
    pub fn parse_object_header(&mut self) -> Result<ObjectId> {
        let (pos, number) = self.expect_token()?;
        let (_, generation) = self.expect_token()?;
        let (_, keyword) = self.expect_token()?;
        match (number, generation, keyword) {
            (Token::Integer(n), Token::Integer(g), Token::Keyword(kw)) if kw == b"obj" => {
                let number = u32::try_from(n)
                    .map_err(|_| PdfError::malformed(pos, "object number out of range"))?;
                let generation = u16::try_from(g)
                    .map_err(|_| PdfError::malformed(pos, "generation out of range"))?;
                Ok(ObjectId::new(number, generation))
            }
            _ => Err(PdfError::malformed(pos, "expected object header")),
        }
    }
}
