//! Object registry: one slot per object number.
//!
//! Slots for objects of an opened file start empty and are filled on first
//! dereference. A flushed slot drops its node and keeps only what was written.

use crate::error::{PdfError, Result};
use crate::model::{Node, ObjectId};
use crate::parser::{Source, SourceEntry};
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// Flush lifecycle of an indirect slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Free,
    InUse,
    MarkedForFlush,
    Flushed,
}

/// What a flush produced. `body` is the serialized object before encryption;
/// for streams it holds the dictionary only.
#[derive(Debug, Clone)]
pub(crate) struct FlushRecord {
    pub body: Vec<u8>,
}

struct Slot {
    generation: u16,
    state: ObjectState,
    node: OnceCell<Node>,
    from_source: bool,
    dirty: bool,
    flushed: Option<FlushRecord>,
}

impl Slot {
    fn new(generation: u16, node: Node) -> Self {
        Self {
            generation,
            state: ObjectState::InUse,
            node: OnceCell::with_value(node),
            from_source: false,
            dirty: true,
            flushed: None,
        }
    }

    const fn is_live(&self) -> bool {
        matches!(self.state, ObjectState::InUse | ObjectState::MarkedForFlush)
    }
}

/// Summary of one slot for cross-reference output.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotSummary {
    pub number: u32,
    pub generation: u16,
    pub state: ObjectState,
    pub from_source: bool,
    pub dirty: bool,
}

#[derive(Default)]
pub struct Registry {
    slots: BTreeMap<u32, Slot>,
    free_list: VecDeque<u32>,
    next_number: u32,
    source: Option<Source>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_number: 1,
            ..Self::default()
        }
    }

    /// Registry backed by an opened file. Slots are created from the
    /// cross-reference index; nodes load on demand.
    pub fn with_source(source: Source) -> Self {
        let mut slots = BTreeMap::new();
        let mut free_list = VecDeque::new();
        for (&number, entry) in source.entries() {
            if number == 0 {
                continue;
            }
            let state = match entry {
                SourceEntry::Free { generation } => {
                    if *generation < u16::MAX {
                        free_list.push_back(number);
                    }
                    ObjectState::Free
                }
                _ => ObjectState::InUse,
            };
            slots.insert(
                number,
                Slot {
                    generation: entry.generation(),
                    state,
                    node: OnceCell::new(),
                    from_source: true,
                    dirty: false,
                    flushed: None,
                },
            );
        }
        let next_number = source.size().max(1);
        Self {
            slots,
            free_list,
            next_number,
            source: Some(source),
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Highest allocated number plus one.
    pub fn size(&self) -> u32 {
        let highest = self.slots.keys().next_back().map_or(1, |n| n + 1);
        highest.max(self.next_number)
    }

    fn live_slot(&self, id: ObjectId) -> Option<&Slot> {
        self.slots
            .get(&id.number)
            .filter(|slot| slot.generation == id.generation && slot.is_live())
    }

    /// Node of a live object, materializing it from the source when needed.
    pub fn load(&self, id: ObjectId) -> Result<Option<&Node>> {
        let Some(slot) = self.live_slot(id) else {
            return Ok(None);
        };
        if let Some(node) = slot.node.get() {
            return Ok(Some(node));
        }
        let Some(source) = &self.source else {
            return Ok(None);
        };
        match source.read_object(id)? {
            Some(node) => Ok(Some(slot.node.get_or_init(|| node))),
            None => Ok(None),
        }
    }

    /// Lenient lookup: dangling, free, flushed and unreadable objects are absent.
    pub fn get(&self, id: ObjectId) -> Option<&Node> {
        match self.load(id) {
            Ok(node) => node,
            Err(e) => {
                warn!(object = %id, error = %e, "object could not be loaded");
                None
            }
        }
    }

    fn check_mutable(&self, id: ObjectId) -> Result<()> {
        match self.state(id) {
            Some(ObjectState::Flushed) => Err(PdfError::ObjectAlreadyFlushed(id)),
            Some(ObjectState::InUse | ObjectState::MarkedForFlush) => Ok(()),
            _ => Err(PdfError::ObjectNotFound(id)),
        }
    }

    /// Mutable access; marks the slot dirty.
    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Node> {
        self.check_mutable(id)?;
        self.load(id)?.ok_or(PdfError::ObjectNotFound(id))?;
        let slot = self
            .slots
            .get_mut(&id.number)
            .ok_or(PdfError::ObjectNotFound(id))?;
        slot.dirty = true;
        slot.node.get_mut().ok_or(PdfError::ObjectNotFound(id))
    }

    /// Replace the node of a live object.
    pub fn replace(&mut self, id: ObjectId, node: Node) -> Result<()> {
        self.check_mutable(id)?;
        let slot = self
            .slots
            .get_mut(&id.number)
            .ok_or(PdfError::ObjectNotFound(id))?;
        slot.node = OnceCell::with_value(node);
        slot.dirty = true;
        Ok(())
    }

    /// Store a decoded payload without marking the slot dirty.
    pub(crate) fn cache_decoded(&mut self, id: ObjectId, data: Vec<u8>) {
        if let Some(stream) = self
            .slots
            .get_mut(&id.number)
            .and_then(|slot| slot.node.get_mut())
            .and_then(Node::as_stream_mut)
        {
            stream.cache_decoded(data);
        }
    }

    fn next_identity(&mut self) -> ObjectId {
        while let Some(number) = self.free_list.pop_front() {
            if let Some(slot) = self.slots.get(&number)
                && slot.state == ObjectState::Free
            {
                return ObjectId::new(number, slot.generation);
            }
        }
        let number = self.next_number.max(1);
        self.next_number = number + 1;
        ObjectId::new(number, 0)
    }

    /// Assign an identity to `node`, reusing freed numbers first.
    pub fn allocate(&mut self, node: Node) -> ObjectId {
        let id = self.next_identity();
        self.slots.insert(id.number, Slot::new(id.generation, node));
        id
    }

    /// Identity for an object written directly by the flush engine. Always a
    /// fresh number at generation 0: containers cannot carry other generations.
    pub(crate) fn reserve(&mut self) -> ObjectId {
        let number = self.size().max(1);
        self.next_number = number + 1;
        let id = ObjectId::new(number, 0);
        let mut slot = Slot::new(id.generation, Node::Null);
        slot.node = OnceCell::new();
        slot.state = ObjectState::Flushed;
        self.slots.insert(id.number, slot);
        id
    }

    /// Release an identity. The next user of the number gets the next generation.
    pub fn free(&mut self, id: ObjectId) -> Result<()> {
        self.check_mutable(id)?;
        let slot = self
            .slots
            .get_mut(&id.number)
            .ok_or(PdfError::ObjectNotFound(id))?;
        slot.state = ObjectState::Free;
        slot.node = OnceCell::new();
        slot.dirty = true;
        slot.generation = slot.generation.saturating_add(1);
        if slot.generation < u16::MAX {
            self.free_list.push_back(id.number);
        }
        Ok(())
    }

    /// State of an identity. Freed numbers report `Free` whatever the generation.
    pub fn state(&self, id: ObjectId) -> Option<ObjectState> {
        let slot = self.slots.get(&id.number)?;
        if slot.state == ObjectState::Free || slot.generation == id.generation {
            Some(slot.state)
        } else {
            None
        }
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        self.live_slot(id).is_some()
    }

    /// `InUse` to `MarkedForFlush`. Returns whether the state changed.
    pub fn mark(&mut self, id: ObjectId) -> bool {
        match self.slots.get_mut(&id.number) {
            Some(slot) if slot.generation == id.generation && slot.state == ObjectState::InUse => {
                slot.state = ObjectState::MarkedForFlush;
                true
            }
            _ => false,
        }
    }

    /// Object of the source that has not been touched.
    pub fn is_unchanged_source(&self, id: ObjectId) -> bool {
        self.slots
            .get(&id.number)
            .is_some_and(|slot| slot.from_source && !slot.dirty)
    }

    /// Live source objects that were modified.
    pub(crate) fn modified_source_ids(&self) -> Vec<ObjectId> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.from_source && slot.dirty && slot.is_live())
            .map(|(&number, slot)| ObjectId::new(number, slot.generation))
            .collect()
    }

    /// Move the node out for writing.
    pub(crate) fn take_node(&mut self, id: ObjectId) -> Result<Option<Node>> {
        if self.load(id)?.is_none() {
            return Ok(None);
        }
        Ok(self
            .slots
            .get_mut(&id.number)
            .and_then(|slot| slot.node.take()))
    }

    /// Put back a node taken for a write that failed.
    pub(crate) fn restore_node(&mut self, id: ObjectId, node: Node) {
        if let Some(slot) = self.slots.get_mut(&id.number) {
            slot.node = OnceCell::with_value(node);
        }
    }

    pub(crate) fn record_flush(&mut self, id: ObjectId, record: FlushRecord) {
        if let Some(slot) = self.slots.get_mut(&id.number) {
            slot.state = ObjectState::Flushed;
            slot.node = OnceCell::new();
            slot.flushed = Some(record);
        }
    }

    pub(crate) fn flushed_record(&self, id: ObjectId) -> Option<&FlushRecord> {
        self.slots
            .get(&id.number)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.flushed.as_ref())
    }

    pub(crate) fn summaries(&self) -> impl Iterator<Item = SlotSummary> + '_ {
        self.slots.iter().map(|(&number, slot)| SlotSummary {
            number,
            generation: slot.generation,
            state: slot.state,
            from_source: slot.from_source,
            dirty: slot.dirty,
        })
    }
}
