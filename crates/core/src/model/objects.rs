//! PDF object types.
//!
//! A [`Node`] is one value of the object graph. Values that are shared between
//! several parents live in the document registry under an [`ObjectId`] and are
//! referenced through [`Node::Reference`].

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;

/// Interned PDF name (without the leading slash).
pub type Name = SmolStr;

/// Identity of an indirect object: object number plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Dictionary with unique name keys, kept in insertion order.
///
/// Equality ignores key order, so two dictionaries with the same entries
/// compare equal even when they were built differently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Name, Node>);

impl Dictionary {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace an entry. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<Node>) -> Option<Node> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove an entry, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Node)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Name, &mut Node)> {
        self.0.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Node> {
        self.0.values()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Node::as_number)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Node::as_i64)
    }

    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_name)
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Node::as_bytes)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Node]> {
        self.get(key).and_then(Node::as_array)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Node::as_dict)
    }

    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Node::as_reference)
    }

    /// Check `/Type` against a name.
    pub fn has_type(&self, name: &str) -> bool {
        self.get_name("Type") == Some(name)
    }
}

impl FromIterator<(Name, Node)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Name, Node)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a Node);
    type IntoIter = indexmap::map::Iter<'a, Name, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Stream: dictionary plus payload.
///
/// `raw` holds the encoded (on-disk) bytes. When a decoded payload has been
/// set through [`Stream::set_data`] it is authoritative and the encoded form
/// is derived again from it when the stream is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    raw: Bytes,
    decoded: Option<Vec<u8>>,
    rewrite: bool,
    compression: Option<i32>,
}

impl Stream {
    /// Stream whose payload is already encoded with the filters in `dict`.
    pub fn new(dict: Dictionary, raw: impl Into<Bytes>) -> Self {
        Self {
            dict,
            raw: raw.into(),
            decoded: None,
            rewrite: false,
            compression: None,
        }
    }

    /// Stream built from logical bytes; filters are applied at flush.
    pub fn from_data(dict: Dictionary, data: Vec<u8>) -> Self {
        Self {
            dict,
            raw: Bytes::new(),
            decoded: Some(data),
            rewrite: true,
            compression: None,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub(crate) fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    pub(crate) fn set_raw(&mut self, raw: impl Into<Bytes>) {
        self.raw = raw.into();
    }

    /// Cached or authoritative decoded payload, if known.
    pub fn decoded(&self) -> Option<&[u8]> {
        self.decoded.as_deref()
    }

    /// Replace the logical payload.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.decoded = Some(data);
        self.rewrite = true;
    }

    pub(crate) fn cache_decoded(&mut self, data: Vec<u8>) {
        if !self.rewrite {
            self.decoded = Some(data);
        }
    }

    /// Whether the encoded bytes must be regenerated from the decoded payload.
    pub fn needs_encoding(&self) -> bool {
        self.rewrite && self.decoded.is_some()
    }

    pub const fn compression_level(&self) -> Option<i32> {
        self.compression
    }

    pub fn set_compression_level(&mut self, level: Option<i32>) {
        self.compression = level;
    }
}

/// PDF object graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Boolean(bool),
    Number(f64),
    /// String bytes (literal or hex in the source).
    TextString(Vec<u8>),
    Name(Name),
    Array(Vec<Node>),
    Dictionary(Dictionary),
    Stream(Box<Stream>),
    Reference(ObjectId),
}

impl Node {
    pub fn name(name: &str) -> Self {
        Self::Name(Name::new(name))
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::TextString(bytes.into())
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::TextString(_) => "string",
            Self::Name(_) => "name",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dictionary",
            Self::Stream(_) => "stream",
            Self::Reference(_) => "reference",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::TextString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or of a stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(d) => Some(d),
            Self::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Self::Dictionary(d) => Some(d),
            Self::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Self::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Self::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Strict dictionary access.
    pub fn try_dict(&self) -> Result<&Dictionary> {
        self.as_dict().ok_or(PdfError::TypeError {
            expected: "dictionary",
            got: self.type_name(),
        })
    }

    /// Strict stream access.
    pub fn try_stream(&self) -> Result<&Stream> {
        self.as_stream().ok_or(PdfError::TypeError {
            expected: "stream",
            got: self.type_name(),
        })
    }

    /// Strict integer access.
    pub fn try_i64(&self) -> Result<i64> {
        self.as_i64().ok_or(PdfError::TypeError {
            expected: "integer",
            got: self.type_name(),
        })
    }

    /// Strict name access.
    pub fn try_name(&self) -> Result<&str> {
        self.as_name().ok_or(PdfError::TypeError {
            expected: "name",
            got: self.type_name(),
        })
    }

    /// Strict array access.
    pub fn try_array(&self) -> Result<&[Node]> {
        self.as_array().ok_or(PdfError::TypeError {
            expected: "array",
            got: self.type_name(),
        })
    }

    /// Visit every indirect reference held directly or nested in this node,
    /// in serialization order.
    pub fn for_each_reference(&self, f: &mut impl FnMut(ObjectId)) {
        match self {
            Self::Reference(id) => f(*id),
            Self::Array(items) => {
                for item in items {
                    item.for_each_reference(f);
                }
            }
            Self::Dictionary(dict) => {
                for value in dict.values() {
                    value.for_each_reference(f);
                }
            }
            Self::Stream(stream) => {
                for value in stream.dict.values() {
                    value.for_each_reference(f);
                }
            }
            _ => {}
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for Node {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for Node {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<ObjectId> for Node {
    fn from(value: ObjectId) -> Self {
        Self::Reference(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::Array(value)
    }
}

impl From<Dictionary> for Node {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<Stream> for Node {
    fn from(value: Stream) -> Self {
        Self::Stream(Box::new(value))
    }
}
