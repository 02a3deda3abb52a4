//! Output sink and object containers.

use crate::error::Result;
use crate::model::{Dictionary, Node, ObjectId, Stream};
use std::io::Write;

/// Second header line; four high bytes mark the file as binary.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Sink that tracks how many bytes have been written.
pub(crate) struct PdfWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    pub const fn position(&self) -> u64 {
        self.position
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    pub fn write_header(&mut self, version: &str) -> Result<()> {
        self.write_all(format!("%PDF-{version}\n").as_bytes())?;
        self.write_all(BINARY_MARKER)
    }

    /// Copy the bytes of the file being updated, ending on a line break.
    pub fn write_source(&mut self, source: &[u8]) -> Result<()> {
        self.write_all(source)?;
        if !source.ends_with(b"\n") && !source.ends_with(b"\r") {
            self.write_all(b"\n")?;
        }
        Ok(())
    }

    /// `n g obj` body `endobj`; returns the offset of the header.
    pub fn write_object(&mut self, id: ObjectId, body: &[u8]) -> Result<u64> {
        let offset = self.position;
        self.write_all(format!("{} {} obj\n", id.number, id.generation).as_bytes())?;
        self.write_all(body)?;
        self.write_all(b"\nendobj\n")?;
        Ok(offset)
    }

    pub fn write_stream_object(&mut self, id: ObjectId, dict: &[u8], payload: &[u8]) -> Result<u64> {
        let offset = self.position;
        self.write_all(format!("{} {} obj\n", id.number, id.generation).as_bytes())?;
        self.write_all(dict)?;
        self.write_all(b"\nstream\n")?;
        self.write_all(payload)?;
        self.write_all(b"\nendstream\nendobj\n")?;
        Ok(offset)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Non-stream objects collected for one `/Type /ObjStm` container.
pub(crate) struct ContainerBuilder {
    id: ObjectId,
    capacity: usize,
    objects: Vec<(u32, Vec<u8>)>,
}

impl ContainerBuilder {
    pub fn new(id: ObjectId, capacity: usize) -> Self {
        Self {
            id,
            capacity: capacity.max(1),
            objects: Vec::new(),
        }
    }

    pub const fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.objects.len() >= self.capacity
    }

    /// Add a serialized object; returns its index in the container.
    pub fn push(&mut self, number: u32, body: Vec<u8>) -> usize {
        self.objects.push((number, body));
        self.objects.len() - 1
    }

    /// Container stream holding the header of `number offset` pairs followed
    /// by the bodies, to be compressed with Flate.
    pub fn into_stream(self) -> Stream {
        let mut header = Vec::new();
        let mut bodies = Vec::new();
        for (number, body) in &self.objects {
            header.extend_from_slice(format!("{} {} ", number, bodies.len()).as_bytes());
            bodies.extend_from_slice(body);
            bodies.push(b'\n');
        }

        let mut dict = Dictionary::new();
        dict.insert("Type", Node::name("ObjStm"));
        dict.insert("N", self.objects.len());
        dict.insert("First", header.len());
        dict.insert("Filter", Node::name("FlateDecode"));

        header.extend_from_slice(&bodies);
        Stream::from_data(dict, header)
    }
}
