//! Cross-reference loading and scan recovery.
//!
//! Sections are followed from `startxref` through `Prev` links, newest first,
//! so the first entry recorded for an object number wins. Hybrid files carry
//! an extra `XRefStm` section whose entries take precedence over the table of
//! the same revision.

use super::lexer::{Lexer, Token};
use super::object_parser::ObjectParser;
use super::source::{parse_container, parse_indirect_at};
use crate::error::{PdfError, Result};
use crate::filter::FilterChain;
use crate::model::{Dictionary, Node, ObjectId};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

static OBJECT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").expect("valid regex"));

/// Where the source keeps one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEntry {
    InFile { offset: usize, generation: u16 },
    InContainer { container: u32, index: usize },
    Free { generation: u16 },
}

impl SourceEntry {
    pub const fn generation(&self) -> u16 {
        match self {
            Self::InFile { generation, .. } | Self::Free { generation } => *generation,
            Self::InContainer { .. } => 0,
        }
    }
}

/// Merged cross-reference information of a source file.
#[derive(Debug, Clone, Default)]
pub struct XrefIndex {
    pub entries: BTreeMap<u32, SourceEntry>,
    pub trailer: Dictionary,
    /// Offset of the newest section, the `Prev` target of an update.
    pub startxref: Option<usize>,
    /// Built by scanning because the cross-reference data was unusable.
    pub recovered: bool,
}

impl XrefIndex {
    /// Merge an older section: existing entries and trailer keys win.
    fn merge_older(&mut self, entries: BTreeMap<u32, SourceEntry>, trailer: &Dictionary) {
        for (number, entry) in entries {
            self.entries.entry(number).or_insert(entry);
        }
        for (key, value) in trailer {
            if !self.trailer.contains_key(key) {
                self.trailer.insert(key.clone(), value.clone());
            }
        }
    }

    /// One past the highest object number in use.
    pub fn size(&self) -> u32 {
        let declared = self
            .trailer
            .get_i64("Size")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let highest = self.entries.keys().next_back().map_or(0, |n| n + 1);
        declared.max(highest)
    }
}

struct Section {
    entries: BTreeMap<u32, SourceEntry>,
    trailer: Dictionary,
}

/// Load the cross-reference index, scanning the file when `strict` is off
/// and the sections cannot be read.
pub fn load_index(data: &Bytes, strict: bool) -> Result<XrefIndex> {
    let loaded = find_startxref(data).and_then(|pos| load_chain(data, pos));
    let err = match loaded {
        Ok(index) if index.trailer.contains_key("Root") => return Ok(index),
        Ok(_) => PdfError::malformed(0, "trailer has no /Root"),
        Err(e) => e,
    };
    if strict || !err.is_recoverable() {
        return Err(err);
    }
    warn!(error = %err, "cross-reference section unusable, scanning for objects");
    scan_index(data)
}

/// Offset named by the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    const KEYWORD: &[u8] = b"startxref";
    let tail_start = data.len().saturating_sub(1024);
    let tail = &data[tail_start..];
    let found = tail
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)
        .ok_or_else(|| PdfError::malformed(data.len(), "startxref not found"))?;

    let keyword_end = tail_start + found + KEYWORD.len();
    let mut lexer = Lexer::at(data, keyword_end);
    match lexer.next_token() {
        Some(Ok((_, Token::Integer(n)))) if n >= 0 && (n as usize) < data.len() => Ok(n as usize),
        _ => Err(PdfError::malformed(keyword_end, "invalid startxref offset")),
    }
}

fn load_chain(data: &Bytes, start: usize) -> Result<XrefIndex> {
    let mut index = XrefIndex {
        startxref: Some(start),
        ..XrefIndex::default()
    };
    let mut visited = HashSet::new();
    let mut next = Some(start);

    while let Some(pos) = next {
        if !visited.insert(pos) {
            break;
        }
        let section = load_section(data, pos)?;

        let hybrid = section
            .trailer
            .get_i64("XRefStm")
            .and_then(|p| usize::try_from(p).ok());
        if let Some(stm_pos) = hybrid
            && visited.insert(stm_pos)
        {
            match load_xref_stream(data, stm_pos) {
                Ok(stm) => index.merge_older(stm.entries, &Dictionary::new()),
                Err(e) => warn!(offset = stm_pos, error = %e, "skipping unreadable XRefStm"),
            }
        }

        next = section
            .trailer
            .get_i64("Prev")
            .and_then(|p| usize::try_from(p).ok());
        index.merge_older(section.entries, &section.trailer);
    }

    debug!(objects = index.entries.len(), "cross-reference loaded");
    Ok(index)
}

fn load_section(data: &Bytes, pos: usize) -> Result<Section> {
    let mut lexer = Lexer::at(data, pos);
    lexer.skip_whitespace();
    if lexer.remaining().starts_with(b"xref") {
        load_traditional_xref(data, lexer.tell())
    } else {
        load_xref_stream(data, pos)
    }
}

fn expect_integer(lexer: &mut Lexer<'_>) -> Result<i64> {
    match lexer.next_token() {
        Some(Ok((_, Token::Integer(n)))) => Ok(n),
        Some(Ok((pos, _))) => Err(PdfError::malformed(pos, "expected integer in xref table")),
        Some(Err(e)) => Err(e),
        None => Err(PdfError::malformed(lexer.tell(), "truncated xref table")),
    }
}

fn load_traditional_xref(data: &[u8], pos: usize) -> Result<Section> {
    let mut entries = BTreeMap::new();
    let mut lexer = Lexer::at(data, pos + b"xref".len());

    loop {
        lexer.skip_whitespace();
        if lexer.remaining().starts_with(b"trailer") {
            lexer.seek(lexer.tell() + b"trailer".len());
            break;
        }
        if lexer.remaining().is_empty() {
            return Err(PdfError::malformed(lexer.tell(), "xref table without trailer"));
        }

        let first = expect_integer(&mut lexer)?;
        let count = expect_integer(&mut lexer)?;
        if first < 0 || count < 0 {
            return Err(PdfError::malformed(lexer.tell(), "negative xref subsection"));
        }
        let mut base = first as u64;

        for i in 0..count as u64 {
            let offset = expect_integer(&mut lexer)?;
            let generation = expect_integer(&mut lexer)?;
            let marker = match lexer.next_token() {
                Some(Ok((_, Token::Keyword(kw)))) => kw,
                _ => return Err(PdfError::malformed(lexer.tell(), "bad xref entry marker")),
            };

            // Some writers start the first subsection at 1 but still list the
            // object 0 free entry; shift so that entry lands on object 0.
            if i == 0 && base > 0 && marker == b"f" && offset == 0 && generation == 65535 {
                base -= 1;
            }

            let Ok(number) = u32::try_from(base + i) else {
                continue;
            };
            let generation = u16::try_from(generation).unwrap_or(u16::MAX);
            let entry = match marker.as_slice() {
                b"n" => SourceEntry::InFile {
                    offset: usize::try_from(offset).unwrap_or(usize::MAX),
                    generation,
                },
                b"f" => SourceEntry::Free { generation },
                _ => return Err(PdfError::malformed(lexer.tell(), "bad xref entry marker")),
            };
            entries.entry(number).or_insert(entry);
        }
    }

    let mut parser = ObjectParser::at(data, lexer.tell());
    let trailer = match parser.parse_object()? {
        Node::Dictionary(dict) => dict,
        other => {
            return Err(PdfError::TypeError {
                expected: "trailer dictionary",
                got: other.type_name(),
            });
        }
    };

    Ok(Section { entries, trailer })
}

fn read_bytes_as_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn load_xref_stream(data: &Bytes, pos: usize) -> Result<Section> {
    let (_, node) = parse_indirect_at(data, pos, &|_| None)?;
    let Node::Stream(stream) = node else {
        return Err(PdfError::malformed(pos, "expected cross-reference stream"));
    };
    let dict = &stream.dict;

    let widths: Vec<usize> = match dict.get_array("W") {
        Some(w) if w.len() == 3 => w
            .iter()
            .map(|n| n.try_i64().map(|v| v.clamp(0, 8) as usize))
            .collect::<Result<_>>()?,
        _ => return Err(PdfError::malformed(pos, "cross-reference stream needs a 3-element /W")),
    };
    let (w0, w1, w2) = (widths[0], widths[1], widths[2]);
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(PdfError::malformed(pos, "cross-reference stream /W is all zero"));
    }

    let size = dict
        .get_i64("Size")
        .ok_or_else(|| PdfError::malformed(pos, "cross-reference stream without /Size"))?;
    let subsections: Vec<(u64, u64)> = match dict.get_array("Index") {
        Some(items) => items
            .chunks_exact(2)
            .map(|pair| Ok((pair[0].try_i64()? as u64, pair[1].try_i64()? as u64)))
            .collect::<Result<_>>()?,
        None => vec![(0, size.max(0) as u64)],
    };

    let chain = FilterChain::from_declaration(dict.get("Filter"), dict.get("DecodeParms"))?;
    let table = chain.decode(stream.raw())?;

    let mut entries = BTreeMap::new();
    let mut rows = table.chunks_exact(entry_size);
    'sections: for (first, count) in subsections {
        for i in 0..count {
            let Some(row) = rows.next() else {
                break 'sections;
            };
            let Ok(number) = u32::try_from(first + i) else {
                continue;
            };
            let kind = if w0 == 0 { 1 } else { read_bytes_as_int(&row[..w0]) };
            let field1 = read_bytes_as_int(&row[w0..w0 + w1]);
            let field2 = read_bytes_as_int(&row[w0 + w1..]);
            let entry = match kind {
                0 => SourceEntry::Free {
                    generation: u16::try_from(field2).unwrap_or(u16::MAX),
                },
                1 => SourceEntry::InFile {
                    offset: usize::try_from(field1).unwrap_or(usize::MAX),
                    generation: u16::try_from(field2).unwrap_or(u16::MAX),
                },
                2 => SourceEntry::InContainer {
                    container: u32::try_from(field1).unwrap_or(u32::MAX),
                    index: usize::try_from(field2).unwrap_or(usize::MAX),
                },
                // Unknown types are references to the null object.
                _ => continue,
            };
            entries.entry(number).or_insert(entry);
        }
    }

    let trailer = dict
        .iter()
        .filter(|(key, _)| {
            !matches!(
                key.as_str(),
                "Length" | "Filter" | "DecodeParms" | "W" | "Index" | "Type"
            )
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Section { entries, trailer })
}

/// Offsets of every `n g obj` marker. Later markers win, matching the last
/// revision of an incrementally updated file.
pub fn scan_objects(data: &[u8]) -> BTreeMap<u32, (usize, u16)> {
    let mut found = BTreeMap::new();
    for cap in OBJECT_MARKER.captures_iter(data) {
        let number = std::str::from_utf8(&cap[1])
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        let generation = std::str::from_utf8(&cap[2])
            .ok()
            .and_then(|s| s.parse::<u16>().ok());
        if let (Some(number), Some(generation), Some(whole)) = (number, generation, cap.get(0)) {
            found.insert(number, (whole.start(), generation));
        }
    }
    found
}

/// Rebuild an index from object markers alone.
fn scan_index(data: &Bytes) -> Result<XrefIndex> {
    let mut entries: BTreeMap<u32, SourceEntry> = scan_objects(data)
        .into_iter()
        .map(|(number, (offset, generation))| {
            (number, SourceEntry::InFile { offset, generation })
        })
        .collect();

    // Members of object containers have no marker of their own.
    let mut members = Vec::new();
    let mut catalog = None;
    for (&number, entry) in &entries {
        let SourceEntry::InFile { offset, .. } = *entry else {
            continue;
        };
        let Ok((id, node)) = parse_indirect_at(data, offset, &|_| None) else {
            continue;
        };
        match &node {
            Node::Stream(stream) if stream.dict.has_type("ObjStm") => {
                match parse_container(stream) {
                    Ok(container) => {
                        for (index, &(member, _)) in container.members().iter().enumerate() {
                            let is_catalog = container
                                .parse_member(index)
                                .is_ok_and(|node| node.as_dict().is_some_and(|d| d.has_type("Catalog")));
                            members.push((member, number, index, is_catalog));
                        }
                    }
                    Err(e) => warn!(object = %id, error = %e, "unreadable object container"),
                }
            }
            Node::Dictionary(dict) if catalog.is_none() && dict.has_type("Catalog") => {
                catalog = Some(id);
            }
            _ => {}
        }
    }
    for (member, container, index, is_catalog) in members {
        entries
            .entry(member)
            .or_insert(SourceEntry::InContainer { container, index });
        if catalog.is_none() && is_catalog {
            catalog = Some(ObjectId::new(member, 0));
        }
    }

    let mut trailer = find_trailer(data).unwrap_or_default();
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    if !trailer.contains_key("Root") {
        let root = catalog
            .ok_or_else(|| PdfError::malformed(0, "no document catalog found while scanning"))?;
        trailer.insert("Root", root);
    }

    let mut index = XrefIndex {
        entries,
        trailer,
        startxref: None,
        recovered: true,
    };
    let size = index.size();
    index.trailer.insert("Size", size);
    warn!(objects = index.entries.len(), "recovered cross-reference by scanning");
    Ok(index)
}

/// Dictionary after the last `trailer` keyword.
fn find_trailer(data: &[u8]) -> Option<Dictionary> {
    const KEYWORD: &[u8] = b"trailer";
    let pos = data.windows(KEYWORD.len()).rposition(|w| w == KEYWORD)?;
    let mut parser = ObjectParser::at(data, pos + KEYWORD.len());
    match parser.parse_object().ok()? {
        Node::Dictionary(dict) => Some(dict),
        _ => None,
    }
}
