//! Error types for the folio object graph and writer.

use crate::model::ObjectId;
use thiserror::Error;

/// Primary error type for folio operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("malformed source at byte {pos}: {msg}")]
    MalformedSource { pos: usize, msg: String },

    #[error("object {0} is already flushed")]
    ObjectAlreadyFlushed(ObjectId),

    #[error(
        "stream {} {} cannot be flushed: its dependency {dependency} was already flushed with different content",
        .object.number,
        .object.generation
    )]
    FlushedDependencyMismatch {
        object: ObjectId,
        dependency: ObjectId,
    },

    #[error("operation requires an indirect object")]
    RequiresIndirectObject,

    #[error("document is closed")]
    DocumentClosed,

    #[error("document is not open for writing")]
    NotWritable,

    #[error("document has no root object")]
    MissingRoot,

    #[error("PDF object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    pub(crate) fn malformed(pos: usize, msg: impl Into<String>) -> Self {
        Self::MalformedSource {
            pos,
            msg: msg.into(),
        }
    }

    /// Whether the scan-based recovery path can work around this error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedSource { .. })
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
