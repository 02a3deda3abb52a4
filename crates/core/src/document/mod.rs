//! Documents: the object registry, flush engine and output.
//!
//! - `registry` - slots, identities and flush states
//! - `flush` - marking, dependency checks and object output
//! - `writer` - position-counting sink and object containers
//! - `xref` - cross-reference table and stream output

mod flush;
pub mod registry;
mod writer;
mod xref;

pub use registry::{ObjectState, Registry};

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, Name, Node, ObjectId};
use crate::parser::Source;
use bytes::Bytes;
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use writer::{ContainerBuilder, PdfWriter};
use xref::XrefBuilder;

/// Informational flush outcome. None of these is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushEvent {
    /// `flush` was requested for an object that is already written.
    AlreadyFlushed { object: ObjectId },
    /// A stream was written while one of its filter or parameter objects had
    /// already been written with matching content.
    DependencyAlreadyFlushed {
        stream: ObjectId,
        dependency: ObjectId,
    },
}

/// An object graph bound to an optional output sink.
///
/// Documents created with [`Document::new`] or opened with
/// [`Document::open_for_update`] write to their sink as objects flush;
/// documents opened with [`Document::open`] are read-only.
pub struct Document<W: Write = Vec<u8>> {
    registry: Registry,
    trailer: Dictionary,
    config: WriterConfig,
    writer: Option<PdfWriter<W>>,
    /// Per stream: the values its filter and parameter objects had while live.
    views: HashMap<ObjectId, HashMap<ObjectId, Node>>,
    /// Objects some stream captured as a dependency.
    watched: HashSet<ObjectId>,
    /// Written values of watched objects.
    confirmed: HashMap<ObjectId, Node>,
    waiting: IndexSet<ObjectId>,
    events: Vec<FlushEvent>,
    reported: HashSet<(ObjectId, ObjectId)>,
    xref: XrefBuilder,
    container: Option<ContainerBuilder>,
    encrypt_id: Option<ObjectId>,
    closed: bool,
}

impl<W: Write> Document<W> {
    fn from_parts(registry: Registry, config: WriterConfig, writer: Option<PdfWriter<W>>) -> Self {
        Self {
            registry,
            trailer: Dictionary::new(),
            config,
            writer,
            views: HashMap::new(),
            watched: HashSet::new(),
            confirmed: HashMap::new(),
            waiting: IndexSet::new(),
            events: Vec::new(),
            reported: HashSet::new(),
            xref: XrefBuilder::new(),
            container: None,
            encrypt_id: None,
            closed: false,
        }
    }

    /// Empty document writing to `sink` with default settings.
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    pub fn with_config(sink: W, mut config: WriterConfig) -> Self {
        config.incremental = false;
        let mut doc = Self::from_parts(Registry::new(), config, Some(PdfWriter::new(sink)));
        doc.register_encryption();
        doc
    }

    /// Open `data` and write a rewritten or updated copy to `sink`.
    pub fn open_for_update(
        data: impl Into<Bytes>,
        sink: W,
        reader: ReaderConfig,
        config: WriterConfig,
    ) -> Result<Self> {
        let source = Source::parse(data.into(), &reader)?;
        let mut trailer = source.trailer().clone();
        for key in ["Prev", "XRefStm", "Size"] {
            trailer.remove(key);
        }

        let mut doc = Self::from_parts(Registry::with_source(source), config, Some(PdfWriter::new(sink)));
        if doc.config.incremental {
            doc.encrypt_id = trailer.get_reference("Encrypt");
        } else {
            trailer.remove("Encrypt");
        }
        doc.trailer = trailer;
        doc.register_encryption();
        Ok(doc)
    }

    /// Allocate the `/Encrypt` dictionary of the configured adapter.
    fn register_encryption(&mut self) {
        let Some(dict) = self
            .config
            .encryption
            .as_ref()
            .and_then(|adapter| adapter.encrypt_dictionary())
        else {
            return;
        };
        let id = self.registry.allocate(Node::Dictionary(dict));
        self.trailer.insert("Encrypt", id);
        self.encrypt_id = Some(id);
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the source was opened through scan recovery.
    pub fn is_recovered(&self) -> bool {
        self.registry.source().is_some_and(Source::is_recovered)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(PdfError::DocumentClosed)
        } else {
            Ok(())
        }
    }

    pub fn root(&self) -> Option<ObjectId> {
        self.trailer.get_reference("Root")
    }

    pub fn set_root(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_open()?;
        self.trailer.insert("Root", id);
        Ok(())
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.trailer.get_reference("Info")
    }

    pub fn set_info(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_open()?;
        self.trailer.insert("Info", id);
        Ok(())
    }

    /// Register a node under a new identity.
    pub fn add(&mut self, node: impl Into<Node>) -> Result<ObjectId> {
        self.ensure_open()?;
        Ok(self.registry.allocate(node.into()))
    }

    /// Lenient lookup; anything not live resolves to `None`.
    pub fn get(&self, id: ObjectId) -> Option<&Node> {
        self.registry.get(id)
    }

    /// Strict lookup.
    pub fn fetch(&self, id: ObjectId) -> Result<&Node> {
        match self.registry.state(id) {
            Some(ObjectState::Flushed) => Err(PdfError::ObjectAlreadyFlushed(id)),
            _ => self.registry.load(id)?.ok_or(PdfError::ObjectNotFound(id)),
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        self.ensure_open()?;
        self.registry.get_mut(id)
    }

    /// Replace the value behind an identity.
    pub fn set(&mut self, id: ObjectId, node: impl Into<Node>) -> Result<()> {
        self.ensure_open()?;
        self.registry.replace(id, node.into())
    }

    fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        let node = self.get_mut(id)?;
        let got = node.type_name();
        node.as_dict_mut().ok_or(PdfError::TypeError {
            expected: "dictionary",
            got,
        })
    }

    /// Set a key of an indirect dictionary or stream dictionary.
    pub fn put(
        &mut self,
        id: ObjectId,
        key: impl Into<Name>,
        value: impl Into<Node>,
    ) -> Result<Option<Node>> {
        Ok(self.dict_mut(id)?.insert(key, value))
    }

    /// Remove a key of an indirect dictionary or stream dictionary.
    pub fn remove(&mut self, id: ObjectId, key: &str) -> Result<Option<Node>> {
        Ok(self.dict_mut(id)?.remove(key))
    }

    /// Free an identity; its number may be reused with the next generation.
    pub fn delete(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_open()?;
        self.waiting.shift_remove(&id);
        self.views.remove(&id);
        self.registry.free(id)
    }

    pub fn state(&self, id: ObjectId) -> Option<ObjectState> {
        self.registry.state(id)
    }

    /// Follow a reference; direct values resolve to themselves.
    pub fn resolve<'a>(&'a self, node: &'a Node) -> Option<&'a Node> {
        match node {
            Node::Reference(id) => self.get(*id),
            other => Some(other),
        }
    }

    /// Dictionary entry with references followed.
    pub fn resolve_entry<'a>(&'a self, dict: &'a Dictionary, key: &str) -> Option<&'a Node> {
        dict.get(key).and_then(|node| self.resolve(node))
    }

    /// Identity of a value that must be indirect.
    pub fn require_indirect(node: &Node) -> Result<ObjectId> {
        node.as_reference().ok_or(PdfError::RequiresIndirectObject)
    }

    pub fn events(&self) -> &[FlushEvent] {
        &self.events
    }

    /// Replace a stream's logical payload; filters apply when it is written.
    pub fn set_stream_data(&mut self, id: ObjectId, data: Vec<u8>) -> Result<()> {
        self.stream_mut(id)?.set_data(data);
        Ok(())
    }

    /// Per-stream deflate level, overriding the document setting.
    pub fn set_compression_level(&mut self, id: ObjectId, level: Option<i32>) -> Result<()> {
        self.stream_mut(id)?.set_compression_level(level);
        Ok(())
    }

    fn stream_mut(&mut self, id: ObjectId) -> Result<&mut crate::model::Stream> {
        let node = self.get_mut(id)?;
        let got = node.type_name();
        node.as_stream_mut().ok_or(PdfError::TypeError {
            expected: "stream",
            got,
        })
    }

    /// Close if needed and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        if !self.closed {
            self.close()?;
        }
        self.writer
            .take()
            .map(PdfWriter::into_inner)
            .ok_or(PdfError::NotWritable)
    }

    /// The sink, whatever state the document is in.
    pub fn into_inner(self) -> Option<W> {
        self.writer.map(PdfWriter::into_inner)
    }
}

impl Document<Vec<u8>> {
    /// Open `data` read-only.
    pub fn open(data: impl Into<Bytes>) -> Result<Self> {
        Self::open_with(data, ReaderConfig::default())
    }

    pub fn open_with(data: impl Into<Bytes>, reader: ReaderConfig) -> Result<Self> {
        let source = Source::parse(data.into(), &reader)?;
        let mut trailer = source.trailer().clone();
        for key in ["Prev", "XRefStm"] {
            trailer.remove(key);
        }
        let mut doc = Self::from_parts(Registry::with_source(source), WriterConfig::default(), None);
        doc.encrypt_id = trailer.get_reference("Encrypt");
        doc.trailer = trailer;
        Ok(doc)
    }
}
