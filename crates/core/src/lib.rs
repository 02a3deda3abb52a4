//! folio - PDF object graph with incremental flushing.
//!
//! Objects are registered in a [`Document`], edited in place and written to
//! the output sink as they are flushed. Stream payloads pass through a
//! [`FilterChain`] built from their `/Filter` and `/DecodeParms` entries.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod security;

pub use config::{DependencyCheck, ReaderConfig, WriterConfig, XrefForm};
pub use document::{Document, FlushEvent, ObjectState, Registry};
pub use error::{PdfError, Result};
pub use filter::{DecodeParams, FilterChain, FilterKind, FilterStage};
pub use model::{Dictionary, Name, Node, ObjectId, Stream};
pub use security::{EncryptionAdapter, Rc4ObjectCipher};
