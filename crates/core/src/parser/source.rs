//! Lazy object source.
//!
//! Holds the bytes of an opened file and its cross-reference index, and
//! materializes single objects on request. Nothing is parsed eagerly apart
//! from the cross-reference data.

use super::lexer::{Lexer, Token, is_whitespace};
use super::object_parser::ObjectParser;
use super::xref_reader::{self, SourceEntry, XrefIndex};
use crate::config::ReaderConfig;
use crate::error::{PdfError, Result};
use crate::filter::{FilterChain, FilterKind};
use crate::model::{Dictionary, Node, ObjectId, Stream};
use crate::security::{EncryptionAdapter, transform_strings};
use bytes::Bytes;
use once_cell::unsync::OnceCell;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Indirect `Length` lookups nested deeper than this give up.
const MAX_LENGTH_DEPTH: usize = 8;

/// Offset just past the payload that ends before the first `endstream`,
/// with one end-of-line marker stripped.
pub(crate) fn find_endstream(data: &[u8]) -> Option<usize> {
    const KEYWORD: &[u8] = b"endstream";
    let pos = data.windows(KEYWORD.len()).position(|w| w == KEYWORD)?;
    let mut end = pos;
    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end)
}

/// Whether `len` payload bytes from `start` are followed by `endstream`.
fn length_fits(data: &[u8], start: usize, len: usize) -> bool {
    let Some(end) = start.checked_add(len).filter(|&end| end <= data.len()) else {
        return false;
    };
    let tail = &data[end..];
    let skip = tail.iter().take_while(|&&b| is_whitespace(b)).count();
    tail[skip..].starts_with(b"endstream")
}

/// Parse the indirect object starting at `offset`.
///
/// `resolve_length` supplies the value of an indirect `/Length`. Streams whose
/// length is missing or wrong are delimited by scanning for `endstream`;
/// cross-reference and container streams are always delimited that way.
pub(crate) fn parse_indirect_at(
    data: &Bytes,
    offset: usize,
    resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
) -> Result<(ObjectId, Node)> {
    if offset >= data.len() {
        return Err(PdfError::malformed(offset, "object offset past end of file"));
    }
    let mut parser = ObjectParser::at(data, offset);
    let id = parser.parse_object_header()?;
    let body = parser.parse_object()?;
    let Node::Dictionary(dict) = body else {
        return Ok((id, body));
    };

    let mut lexer = Lexer::at(data, parser.tell());
    lexer.skip_whitespace();
    if !lexer.remaining().starts_with(b"stream") {
        return Ok((id, Node::Dictionary(dict)));
    }
    let mut start = lexer.tell() + b"stream".len();
    if data.get(start) == Some(&b'\r') {
        start += 1;
    }
    if data.get(start) == Some(&b'\n') {
        start += 1;
    }

    let scan_only = dict.has_type("XRef") || dict.has_type("ObjStm");
    let declared = if scan_only {
        None
    } else {
        match dict.get("Length") {
            Some(Node::Reference(length_id)) => resolve_length(*length_id),
            Some(node) => node.as_i64(),
            None => None,
        }
        .and_then(|n| usize::try_from(n).ok())
    };

    let end = match declared {
        Some(len) if length_fits(data, start, len) => start + len,
        _ => {
            if declared.is_some() {
                warn!(object = %id, "declared stream length is wrong, scanning for endstream");
            }
            find_endstream(&data[start..]).map_or(data.len(), |e| start + e)
        }
    };

    Ok((id, Node::from(Stream::new(dict, data.slice(start..end)))))
}

/// Decoded object container: a header of `number offset` pairs followed by
/// the member bodies.
pub(crate) struct ObjectContainer {
    body: Vec<u8>,
    first: usize,
    members: Vec<(u32, usize)>,
}

impl ObjectContainer {
    pub fn members(&self) -> &[(u32, usize)] {
        &self.members
    }

    /// Position of an object number in the header.
    pub fn position_of(&self, number: u32) -> Option<usize> {
        self.members.iter().position(|&(n, _)| n == number)
    }

    pub fn parse_member(&self, index: usize) -> Result<Node> {
        let &(_, offset) = self.members.get(index).ok_or_else(|| {
            PdfError::malformed(index, format!("container has {} members", self.members.len()))
        })?;
        let start = self.first.saturating_add(offset);
        if start >= self.body.len() {
            return Err(PdfError::malformed(start, "container member past end"));
        }
        ObjectParser::at(&self.body, start).parse_object()
    }
}

/// Decode a `/Type /ObjStm` stream with direct filter entries.
pub(crate) fn parse_container(stream: &Stream) -> Result<ObjectContainer> {
    let chain = FilterChain::from_declaration(
        stream.dict.get("Filter"),
        stream.dict.get("DecodeParms"),
    )?;
    container_from_body(&stream.dict, chain.decode(stream.raw())?)
}

fn container_from_body(dict: &Dictionary, body: Vec<u8>) -> Result<ObjectContainer> {
    let count = dict
        .get_i64("N")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PdfError::malformed(0, "object container without /N"))?;
    let first = dict
        .get_i64("First")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PdfError::malformed(0, "object container without /First"))?;

    let header = &body[..first.min(body.len())];
    let mut lexer = Lexer::new(header);
    // Each header entry takes at least two bytes.
    let mut members = Vec::with_capacity(count.min(header.len() / 2));
    for _ in 0..count {
        let pair = (lexer.next_token(), lexer.next_token());
        match pair {
            (Some(Ok((_, Token::Integer(number)))), Some(Ok((_, Token::Integer(offset))))) => {
                let (Ok(number), Ok(offset)) = (u32::try_from(number), usize::try_from(offset))
                else {
                    return Err(PdfError::malformed(lexer.tell(), "bad container header entry"));
                };
                members.push((number, offset));
            }
            _ => return Err(PdfError::malformed(lexer.tell(), "truncated container header")),
        }
    }

    Ok(ObjectContainer {
        body,
        first,
        members,
    })
}

/// Source bytes plus everything needed to materialize objects from them.
pub struct Source {
    data: Bytes,
    index: XrefIndex,
    strict: bool,
    decryption: Option<Arc<dyn EncryptionAdapter>>,
    encrypt_id: Option<ObjectId>,
    containers: RefCell<HashMap<u32, Arc<ObjectContainer>>>,
    scanned: OnceCell<BTreeMap<u32, (usize, u16)>>,
    length_depth: Cell<usize>,
}

impl Source {
    pub fn parse(data: Bytes, config: &ReaderConfig) -> Result<Self> {
        if !data.starts_with(b"%PDF-") {
            // Junk before the header is common; only warn.
            warn!("source does not start with a %PDF header");
        }
        let index = xref_reader::load_index(&data, config.strict)?;
        let encrypt_id = index.trailer.get_reference("Encrypt");
        debug!(
            objects = index.entries.len(),
            recovered = index.recovered,
            "source opened"
        );
        Ok(Self {
            data,
            index,
            strict: config.strict,
            decryption: config.decryption.clone(),
            encrypt_id,
            containers: RefCell::new(HashMap::new()),
            scanned: OnceCell::new(),
            length_depth: Cell::new(0),
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.index.trailer
    }

    pub fn entries(&self) -> &BTreeMap<u32, SourceEntry> {
        &self.index.entries
    }

    pub fn entry(&self, number: u32) -> Option<SourceEntry> {
        self.index.entries.get(&number).copied()
    }

    /// Offset of the newest cross-reference section.
    pub fn startxref(&self) -> Option<usize> {
        self.index.startxref
    }

    pub fn is_recovered(&self) -> bool {
        self.index.recovered
    }

    pub fn size(&self) -> u32 {
        self.index.size()
    }

    /// Materialize one object. Free and unknown identities give `None`.
    pub fn read_object(&self, id: ObjectId) -> Result<Option<Node>> {
        let node = match self.entry(id.number) {
            Some(SourceEntry::Free { .. }) => return Ok(None),
            Some(SourceEntry::InFile { generation, .. }) if generation != id.generation => {
                return Ok(None);
            }
            Some(SourceEntry::InFile { offset, .. }) => match self.parse_in_file(id, offset) {
                Ok(node) => Some(node),
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    warn!(object = %id, offset, error = %e, "xref entry points at garbage");
                    self.read_scanned(id)
                }
            },
            Some(SourceEntry::InContainer { container, index }) => {
                if id.generation != 0 {
                    return Ok(None);
                }
                // Members are plain text inside an already decrypted container.
                return match self.read_member(id.number, container, index) {
                    Ok(node) => Ok(Some(node)),
                    Err(e) if self.strict => Err(e),
                    Err(e) => {
                        warn!(object = %id, container, error = %e, "unreadable container member");
                        Ok(None)
                    }
                };
            }
            None if self.strict || self.index.recovered => return Ok(None),
            None => self.read_scanned(id),
        };

        match node {
            Some(node) => self.decrypt(id, node).map(Some),
            None => Ok(None),
        }
    }

    fn parse_in_file(&self, id: ObjectId, offset: usize) -> Result<Node> {
        let (found, node) = parse_indirect_at(&self.data, offset, &|length_id| {
            self.resolve_length(id, length_id)
        })?;
        if found != id {
            return Err(PdfError::malformed(
                offset,
                format!("expected object {id}, found {found}"),
            ));
        }
        Ok(node)
    }

    fn read_scanned(&self, id: ObjectId) -> Option<Node> {
        let scanned = self
            .scanned
            .get_or_init(|| xref_reader::scan_objects(&self.data));
        let &(offset, generation) = scanned.get(&id.number)?;
        if generation != id.generation {
            return None;
        }
        match self.parse_in_file(id, offset) {
            Ok(node) => {
                warn!(object = %id, offset, "object recovered by scanning");
                Some(node)
            }
            Err(e) => {
                warn!(object = %id, error = %e, "object not recoverable");
                None
            }
        }
    }

    /// Value of an indirect `/Length`, read straight from the source so that
    /// no registry state is touched.
    fn resolve_length(&self, owner: ObjectId, length_id: ObjectId) -> Option<i64> {
        let depth = self.length_depth.get();
        if length_id == owner || depth >= MAX_LENGTH_DEPTH {
            return None;
        }
        self.length_depth.set(depth + 1);
        let value = self.read_object(length_id).ok().flatten();
        self.length_depth.set(depth);
        value.and_then(|n| n.as_i64())
    }

    fn container(&self, number: u32) -> Result<Arc<ObjectContainer>> {
        if let Some(cached) = self.containers.borrow().get(&number) {
            return Ok(Arc::clone(cached));
        }
        let container_id = ObjectId::new(number, 0);
        let node = match self.entry(number) {
            Some(SourceEntry::InFile { .. }) => self.read_object(container_id)?,
            _ => None,
        }
        .ok_or(PdfError::ObjectNotFound(container_id))?;
        let stream = node.try_stream()?;

        let filter = self.resolve_shallow(stream.dict.get("Filter"))?;
        let parms = self.resolve_shallow(stream.dict.get("DecodeParms"))?;
        let chain = FilterChain::from_declaration(filter.as_ref(), parms.as_ref())?;
        let container = Arc::new(container_from_body(&stream.dict, chain.decode(stream.raw())?)?);

        self.containers
            .borrow_mut()
            .insert(number, Arc::clone(&container));
        Ok(container)
    }

    /// Follow one level of indirection for filter entries of source-only streams.
    fn resolve_shallow(&self, node: Option<&Node>) -> Result<Option<Node>> {
        match node {
            Some(Node::Reference(id)) => self.read_object(*id),
            other => Ok(other.cloned()),
        }
    }

    fn read_member(&self, number: u32, container: u32, index: usize) -> Result<Node> {
        let objects = self.container(container)?;
        // Trust the header over the xref index when they disagree.
        let index = match objects.members().get(index) {
            Some(&(n, _)) if n == number => index,
            _ => objects.position_of(number).ok_or_else(|| {
                PdfError::malformed(index, format!("object {number} not in container {container}"))
            })?,
        };
        objects.parse_member(index)
    }

    fn decrypt(&self, id: ObjectId, mut node: Node) -> Result<Node> {
        let Some(adapter) = &self.decryption else {
            return Ok(node);
        };
        if Some(id) == self.encrypt_id {
            return Ok(node);
        }
        if let Node::Stream(stream) = &node
            && (stream.dict.has_type("XRef") || has_identity_crypt(&stream.dict))
        {
            return Ok(node);
        }

        transform_strings(&mut node, &mut |s| adapter.decrypt_bytes(id, s))?;
        if let Node::Stream(stream) = &mut node {
            let plain = adapter.decrypt_bytes(id, stream.raw())?;
            stream.set_raw(plain);
        }
        Ok(node)
    }
}

fn is_crypt(name: &str) -> bool {
    matches!(FilterKind::from_name(name), Ok(FilterKind::Crypt))
}

/// A `Crypt` stage in the declared filters exempts a stream from the
/// document-wide adapter.
pub(crate) fn has_identity_crypt(dict: &Dictionary) -> bool {
    match dict.get("Filter") {
        Some(Node::Name(name)) => is_crypt(name),
        Some(Node::Array(items)) => items.iter().filter_map(Node::as_name).any(is_crypt),
        _ => false,
    }
}
