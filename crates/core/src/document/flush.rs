//! Flush engine.
//!
//! A pass first marks everything reachable from its roots in depth-first
//! pre-order, capturing for each stream the live values of the objects its
//! `/Filter` and `/DecodeParms` reach. It then writes the marked objects in
//! marking order. A stream whose filter object was written earlier is checked
//! against that captured value.

use super::registry::{FlushRecord, ObjectState};
use super::writer::{ContainerBuilder, PdfWriter};
use super::xref::XrefEntry;
use super::{Document, FlushEvent};
use crate::config::{DependencyCheck, XrefForm};
use crate::codec::flate;
use crate::error::{PdfError, Result};
use crate::filter::{FilterChain, FilterKind};
use crate::model::serialize::to_bytes;
use crate::model::{Dictionary, Node, ObjectId, Stream};
use crate::parser::ObjectParser;
use crate::security::transform_strings;
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info};

/// Nesting limit when substituting filter and parameter objects.
const MAX_RESOLVE_DEPTH: usize = 32;

/// References held by a node, in serialization order. Stream lengths are
/// written directly, so a `/Length` reference is not followed. `/Parent`
/// back-links are only followed by the final pass.
fn collect_children(node: &Node, climb_parents: bool, out: &mut Vec<ObjectId>) {
    let (dict, is_stream) = match node {
        Node::Dictionary(dict) => (dict, false),
        Node::Stream(stream) => (&stream.dict, true),
        other => {
            other.for_each_reference(&mut |id| out.push(id));
            return;
        }
    };
    for (key, value) in dict {
        let key = key.as_str();
        if (is_stream && key == "Length") || (!climb_parents && key == "Parent") {
            continue;
        }
        value.for_each_reference(&mut |id| out.push(id));
    }
}

/// References named directly by a stream's filter entries.
fn declared_dependencies(dict: &Dictionary) -> Vec<ObjectId> {
    let mut deps = Vec::new();
    for key in ["Filter", "DecodeParms"] {
        if let Some(value) = dict.get(key) {
            value.for_each_reference(&mut |id| deps.push(id));
        }
    }
    deps
}

/// Compare a captured value with the bytes its object was written with,
/// ignoring key order, null entries and number formatting.
fn structurally_equal(view: &Node, written: &[u8]) -> bool {
    let Ok(view_bytes) = to_bytes(view) else {
        return false;
    };
    match (
        ObjectParser::new(&view_bytes).parse_object(),
        ObjectParser::new(written).parse_object(),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Serialized form of a value as recorded at flush: a stream contributes its
/// dictionary only.
fn recorded_body(node: &Node) -> Result<Vec<u8>> {
    match node {
        Node::Stream(stream) => to_bytes(&Node::Dictionary(stream.dict.clone())),
        other => to_bytes(other),
    }
}

impl<W: Write> Document<W> {
    fn incremental(&self) -> bool {
        self.config.incremental && self.registry.source().is_some()
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.writer.is_none() {
            return Err(PdfError::NotWritable);
        }
        Ok(())
    }

    /// Sink with the header (or the copied source) already written.
    fn output(&mut self) -> Result<&mut PdfWriter<W>> {
        let writer = self.writer.as_mut().ok_or(PdfError::NotWritable)?;
        if writer.position() == 0 {
            match self.registry.source() {
                Some(source) if self.config.incremental => writer.write_source(source.data())?,
                _ => writer.write_header(&self.config.version)?,
            }
        }
        Ok(writer)
    }

    /// Queue an object for the next [`flush_waiting`](Self::flush_waiting).
    pub fn mark_for_flush(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_writable()?;
        match self.registry.state(id) {
            Some(ObjectState::Flushed) => Ok(()),
            Some(ObjectState::InUse | ObjectState::MarkedForFlush) => {
                self.registry.mark(id);
                self.waiting.insert(id);
                Ok(())
            }
            _ => Err(PdfError::ObjectNotFound(id)),
        }
    }

    /// Write an object and everything it reaches that is not written yet.
    ///
    /// Flushing an object that is already written is a no-op recorded as
    /// [`FlushEvent::AlreadyFlushed`].
    pub fn flush(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_writable()?;
        match self.registry.state(id) {
            Some(ObjectState::Flushed) => {
                info!(object = %id, "object already flushed");
                self.events.push(FlushEvent::AlreadyFlushed { object: id });
                Ok(())
            }
            Some(ObjectState::InUse | ObjectState::MarkedForFlush) => self.run_pass(&[id], false),
            _ => Err(PdfError::ObjectNotFound(id)),
        }
    }

    /// [`flush`](Self::flush) for a value that must be an indirect reference.
    pub fn flush_value(&mut self, node: &Node) -> Result<()> {
        let id = Self::require_indirect(node)?;
        self.flush(id)
    }

    /// Flush everything queued with [`mark_for_flush`](Self::mark_for_flush).
    pub fn flush_waiting(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let roots: Vec<ObjectId> = self.waiting.iter().copied().collect();
        self.run_pass(&roots, false)
    }

    fn run_pass(&mut self, roots: &[ObjectId], final_pass: bool) -> Result<()> {
        let order = self.mark_reachable(roots, final_pass);
        debug!(objects = order.len(), final_pass, "flush pass");
        for id in order {
            if self.registry.state(id) == Some(ObjectState::MarkedForFlush) {
                self.write_object(id)?;
            }
        }
        let registry = &self.registry;
        self.waiting.retain(|id| registry.is_live(*id));
        Ok(())
    }

    fn mark_reachable(&mut self, roots: &[ObjectId], final_pass: bool) -> Vec<ObjectId> {
        let incremental = self.incremental();
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<(ObjectId, bool)> = roots.iter().rev().map(|&id| (id, true)).collect();

        while let Some((id, is_root)) = stack.pop() {
            if !self.registry.is_live(id) || !seen.insert(id) {
                continue;
            }
            // An update leaves untouched source objects where they are.
            if incremental && !is_root && self.registry.is_unchanged_source(id) {
                continue;
            }
            let Some(node) = self.registry.get(id) else {
                continue;
            };
            let mut children = Vec::new();
            collect_children(node, final_pass, &mut children);
            let is_stream = matches!(node, Node::Stream(_));

            self.registry.mark(id);
            order.push(id);
            if is_stream {
                self.capture_view(id);
            }
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }
        order
    }

    /// Record the live values of everything a stream's filter entries reach.
    pub(super) fn capture_view(&mut self, stream_id: ObjectId) {
        let Some(dict) = self.registry.get(stream_id).and_then(Node::as_dict) else {
            return;
        };
        let mut pending = declared_dependencies(dict);
        let mut seen = HashSet::new();
        let mut captured = Vec::new();
        while let Some(dep) = pending.pop() {
            if !seen.insert(dep) {
                continue;
            }
            if let Some(node) = self.registry.get(dep) {
                node.for_each_reference(&mut |id| pending.push(id));
                captured.push((dep, node.clone()));
            }
        }
        if !captured.is_empty() {
            self.watched.extend(captured.iter().map(|(dep, _)| *dep));
            self.views.entry(stream_id).or_default().extend(captured);
        }
    }

    /// `/Filter` and `/DecodeParms` with every reference replaced by its value.
    pub(super) fn resolve_declaration(
        &mut self,
        stream_id: ObjectId,
        dict: &Dictionary,
        report: bool,
    ) -> Result<(Option<Node>, Option<Node>)> {
        let filter = dict
            .get("Filter")
            .map(|node| self.resolve_dependency(stream_id, node, report, 0))
            .transpose()?;
        let parms = dict
            .get("DecodeParms")
            .map(|node| self.resolve_dependency(stream_id, node, report, 0))
            .transpose()?;
        Ok((filter, parms))
    }

    fn resolve_dependency(
        &mut self,
        stream_id: ObjectId,
        node: &Node,
        report: bool,
        depth: usize,
    ) -> Result<Node> {
        if depth > MAX_RESOLVE_DEPTH {
            return Ok(Node::Null);
        }
        match node {
            Node::Reference(dep) => {
                let dep = *dep;
                let value = match self.registry.state(dep) {
                    Some(ObjectState::InUse | ObjectState::MarkedForFlush) => {
                        self.registry.get(dep).cloned().unwrap_or(Node::Null)
                    }
                    Some(ObjectState::Flushed) => self.check_flushed_dependency(stream_id, dep, report)?,
                    _ => Node::Null,
                };
                self.resolve_dependency(stream_id, &value, report, depth + 1)
            }
            Node::Array(items) => items
                .iter()
                .map(|item| self.resolve_dependency(stream_id, item, report, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Node::Array),
            Node::Dictionary(dict) => dict
                .iter()
                .map(|(key, value)| {
                    Ok((
                        key.clone(),
                        self.resolve_dependency(stream_id, value, report, depth + 1)?,
                    ))
                })
                .collect::<Result<Dictionary>>()
                .map(Node::Dictionary),
            other => Ok(other.clone()),
        }
    }

    /// Value to use for a dependency that is already written: the stream's own
    /// view of it, or the value written while another stream watched it. The
    /// value must still match the written bytes.
    fn check_flushed_dependency(
        &mut self,
        stream_id: ObjectId,
        dep: ObjectId,
        report: bool,
    ) -> Result<Node> {
        let mismatch = PdfError::FlushedDependencyMismatch {
            object: stream_id,
            dependency: dep,
        };
        let view = self
            .views
            .get(&stream_id)
            .and_then(|v| v.get(&dep))
            .or_else(|| self.confirmed.get(&dep))
            .cloned();
        let Some(view) = view else {
            return Err(mismatch);
        };
        let Some(record) = self.registry.flushed_record(dep) else {
            return Err(mismatch);
        };
        let consistent = match self.config.dependency_check {
            DependencyCheck::Exact => recorded_body(&view)? == record.body,
            DependencyCheck::Structural => match &view {
                Node::Stream(stream) => {
                    structurally_equal(&Node::Dictionary(stream.dict.clone()), &record.body)
                }
                other => structurally_equal(other, &record.body),
            },
        };
        if !consistent {
            return Err(mismatch);
        }
        if report && self.reported.insert((stream_id, dep)) {
            info!(stream = %stream_id, dependency = %dep, "dependency already flushed with matching content");
            self.events.push(FlushEvent::DependencyAlreadyFlushed {
                stream: stream_id,
                dependency: dep,
            });
        }
        Ok(view)
    }

    /// Decoded payload of a stream, read through its current filter objects.
    pub fn decode_stream(&mut self, id: ObjectId) -> Result<Vec<u8>> {
        let stream = self.fetch(id)?.try_stream()?;
        let known = stream.decoded().map(<[u8]>::to_vec);
        let dict = stream.dict.clone();
        let raw = stream.raw_bytes();

        self.capture_view(id);
        if let Some(data) = known {
            return Ok(data);
        }
        let (filter, parms) = self.resolve_declaration(id, &dict, false)?;
        let data = FilterChain::from_declaration(filter.as_ref(), parms.as_ref())?.decode(&raw)?;
        self.registry.cache_decoded(id, data.clone());
        Ok(data)
    }

    /// Decode the current payload and append `data` to it.
    pub fn append_stream_data(&mut self, id: ObjectId, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut payload = self.decode_stream(id)?;
        payload.extend_from_slice(data);
        self.set_stream_data(id, payload)
    }

    fn write_object(&mut self, id: ObjectId) -> Result<()> {
        let Some(node) = self.registry.take_node(id)? else {
            return Ok(());
        };
        match self.emit(id, &node) {
            Ok(record) => {
                self.registry.record_flush(id, record);
                if self.watched.contains(&id) {
                    self.confirmed.insert(id, node);
                }
                Ok(())
            }
            Err(e) => {
                self.registry.restore_node(id, node);
                Err(e)
            }
        }
    }

    fn emit(&mut self, id: ObjectId, node: &Node) -> Result<FlushRecord> {
        if self.incremental() && self.registry.is_unchanged_source(id) {
            return Ok(FlushRecord {
                body: recorded_body(node)?,
            });
        }
        match node {
            Node::Stream(stream) => self.emit_stream(id, stream),
            other => self.emit_plain(id, other),
        }
    }

    fn emit_plain(&mut self, id: ObjectId, node: &Node) -> Result<FlushRecord> {
        let body = to_bytes(node)?;
        if self.config.object_streams && id.generation == 0 && Some(id) != self.encrypt_id {
            let (container, index) = self.push_to_container(id.number, body.clone())?;
            debug!(object = %id, container, index, "object placed in container");
            return Ok(FlushRecord { body });
        }

        let written = match self.config.encryption.clone() {
            Some(adapter) if Some(id) != self.encrypt_id => {
                let mut encrypted = node.clone();
                transform_strings(&mut encrypted, &mut |s| adapter.encrypt_bytes(id, s))?;
                to_bytes(&encrypted)?
            }
            _ => body.clone(),
        };
        let offset = self.output()?.write_object(id, &written)?;
        self.xref.record(
            id.number,
            XrefEntry::InUse {
                offset,
                generation: id.generation,
            },
        );
        debug!(object = %id, offset, "object written");
        Ok(FlushRecord { body })
    }

    fn emit_stream(&mut self, id: ObjectId, stream: &Stream) -> Result<FlushRecord> {
        let (filter, parms) = self.resolve_declaration(id, &stream.dict, true)?;
        let chain = FilterChain::from_declaration(filter.as_ref(), parms.as_ref());
        let exempt = stream.dict.has_type("XRef")
            || chain
                .as_ref()
                .is_ok_and(|chain| chain.contains(FilterKind::Crypt));
        let level = stream
            .compression_level()
            .unwrap_or(self.config.compression_level);
        let mut dict = stream.dict.clone();

        let payload = if stream.needs_encoding() {
            let data = stream.decoded().unwrap_or_default();
            let mut chain = chain?;
            if chain.is_empty() && level != 0 && !dict.contains_key("Filter") {
                dict.insert("Filter", Node::name("FlateDecode"));
                chain = FilterChain::flate();
            }
            chain.encode(data, level)?
        } else {
            let outermost = chain
                .ok()
                .and_then(|chain| chain.outermost().map(|stage| stage.kind));
            match (stream.compression_level(), outermost) {
                (Some(level), Some(FilterKind::FlateDecode)) => {
                    flate::deflate(&flate::inflate(stream.raw())?, level)?
                }
                _ => stream.raw().to_vec(),
            }
        };

        self.write_stream(id, dict, payload, exempt)
    }

    /// Encrypt unless exempt, set `/Length` and write.
    fn write_stream(
        &mut self,
        id: ObjectId,
        mut dict: Dictionary,
        payload: Vec<u8>,
        exempt: bool,
    ) -> Result<FlushRecord> {
        let adapter = if exempt || Some(id) == self.encrypt_id {
            None
        } else {
            self.config.encryption.clone()
        };

        let mut written = dict.clone();
        let payload = match adapter {
            Some(adapter) => {
                let mut encrypt = |s: &[u8]| adapter.encrypt_bytes(id, s);
                for (_, value) in written.iter_mut() {
                    transform_strings(value, &mut encrypt)?;
                }
                adapter.encrypt_bytes(id, &payload)?
            }
            None => payload,
        };
        dict.insert("Length", payload.len());
        written.insert("Length", payload.len());

        let written = to_bytes(&Node::Dictionary(written))?;
        let offset = self.output()?.write_stream_object(id, &written, &payload)?;
        self.xref.record(
            id.number,
            XrefEntry::InUse {
                offset,
                generation: id.generation,
            },
        );
        debug!(object = %id, offset, length = payload.len(), "stream written");
        Ok(FlushRecord {
            body: to_bytes(&Node::Dictionary(dict))?,
        })
    }

    fn push_to_container(&mut self, number: u32, body: Vec<u8>) -> Result<(u32, usize)> {
        let capacity = self.config.container_capacity;
        let registry = &mut self.registry;
        let container = self
            .container
            .get_or_insert_with(|| ContainerBuilder::new(registry.reserve(), capacity));
        let index = container.push(number, body);
        let container_number = container.id().number;
        let full = container.is_full();

        self.xref.record(
            number,
            XrefEntry::InContainer {
                container: container_number,
                index,
            },
        );
        if full {
            self.finish_container()?;
        }
        Ok((container_number, index))
    }

    /// Write the pending container, if any.
    fn finish_container(&mut self) -> Result<()> {
        let Some(container) = self.container.take() else {
            return Ok(());
        };
        if container.is_empty() {
            return Ok(());
        }
        let id = container.id();
        let stream = container.into_stream();
        let payload = FilterChain::flate().encode(
            stream.decoded().unwrap_or_default(),
            self.config.compression_level,
        )?;
        let record = self.write_stream(id, stream.dict.clone(), payload, false)?;
        self.registry.record_flush(id, record);
        debug!(container = %id, "object container written");
        Ok(())
    }

    /// Final pass, cross-reference section and trailer. The document accepts
    /// no further changes afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.writer.is_none() {
            self.closed = true;
            return Ok(());
        }
        let root = self.root().ok_or(PdfError::MissingRoot)?;

        let mut roots = vec![root];
        roots.extend(self.info());
        roots.extend(self.encrypt_id);
        roots.extend(self.waiting.iter().copied());
        if self.incremental() {
            roots.extend(self.registry.modified_source_ids());
        }
        self.run_pass(&roots, true)?;
        self.finish_container()?;
        self.record_unwritten();

        match self.config.effective_xref_form() {
            XrefForm::Table => self.write_xref_table()?,
            XrefForm::Stream => self.write_xref_stream()?,
        }
        self.output()?.flush()?;
        self.closed = true;
        info!(objects = self.xref.len(), "document closed");
        Ok(())
    }

    /// Free entries for numbers that hold nothing in this output.
    fn record_unwritten(&mut self) {
        let incremental = self.incremental();
        let mut free = Vec::new();
        for slot in self.registry.summaries() {
            let written = matches!(slot.state, ObjectState::Flushed);
            // In an update, untouched source slots keep their old entries.
            if written || (incremental && slot.from_source && !slot.dirty) {
                continue;
            }
            let generation = match slot.state {
                ObjectState::Free => slot.generation,
                _ => slot.generation.saturating_add(1),
            };
            free.push((slot.number, generation));
        }
        for (number, generation) in free {
            self.xref.record(number, XrefEntry::Free { generation });
        }
    }

    fn trailer_for_output(&self, size: u32) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.insert("Size", size);
        for key in ["Root", "Info", "Encrypt"] {
            if let Some(value) = self.trailer.get(key) {
                trailer.insert(key, value.clone());
            }
        }
        let id = self.trailer.get("ID").cloned().unwrap_or_else(|| {
            let seed = format!(
                "{}|{}|{}",
                self.config.version,
                size,
                self.root().map(|id| id.to_string()).unwrap_or_default()
            );
            let digest = md5::compute(seed.as_bytes()).0.to_vec();
            Node::Array(vec![Node::string(digest.clone()), Node::string(digest)])
        });
        trailer.insert("ID", id);
        if self.incremental()
            && let Some(prev) = self.registry.source().and_then(|s| s.startxref())
        {
            trailer.insert("Prev", prev);
        }
        trailer
    }

    fn write_xref_table(&mut self) -> Result<()> {
        let size = self.registry.size();
        let trailer = to_bytes(&Node::Dictionary(self.trailer_for_output(size)))?;
        let table = self.xref.write_table();
        let writer = self.output()?;
        let start = writer.position();
        writer.write_all(&table)?;
        writer.write_all(b"trailer\n")?;
        writer.write_all(&trailer)?;
        writer.write_all(format!("\nstartxref\n{start}\n%%EOF\n").as_bytes())?;
        debug!(offset = start, "cross-reference table written");
        Ok(())
    }

    fn write_xref_stream(&mut self) -> Result<()> {
        let id = self.registry.reserve();
        let start = self.output()?.position();
        self.xref.record(
            id.number,
            XrefEntry::InUse {
                offset: start,
                generation: id.generation,
            },
        );

        let size = self.registry.size();
        let (rows, widths, index) = self.xref.stream_rows();
        let mut dict = self.trailer_for_output(size);
        dict.insert("Type", Node::name("XRef"));
        dict.insert("W", widths.iter().map(|&w| Node::from(w)).collect::<Vec<_>>());
        dict.insert("Index", index);
        dict.insert("Filter", Node::name("FlateDecode"));
        let payload = FilterChain::flate().encode(&rows, self.config.compression_level)?;

        let record = self.write_stream(id, dict, payload, true)?;
        self.registry.record_flush(id, record);
        self.output()?
            .write_all(format!("startxref\n{start}\n%%EOF\n").as_bytes())?;
        debug!(offset = start, "cross-reference stream written");
        Ok(())
    }
}
