//! Reader and writer settings.

use crate::security::EncryptionAdapter;
use std::fmt;
use std::sync::Arc;

/// Cross-reference section layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XrefForm {
    /// Plain-text table of 20-byte entries.
    #[default]
    Table,
    /// Binary table inside a `/Type /XRef` stream.
    Stream,
}

/// How a stream's view of a dependency is compared with the bytes that
/// dependency was already flushed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyCheck {
    /// Same names and parameter values; key order and number formatting ignored.
    #[default]
    Structural,
    /// Serialized bytes must be identical.
    Exact,
}

/// Settings for writing a document.
#[derive(Clone)]
pub struct WriterConfig {
    /// Deflate level for streams: -1 default, 0 store, 1 to 9.
    pub compression_level: i32,

    /// Pack non-stream objects into object containers.
    pub object_streams: bool,

    /// Maximum number of objects per container.
    pub container_capacity: usize,

    /// Requested cross-reference layout. Containers force [`XrefForm::Stream`].
    pub xref_form: XrefForm,

    /// Append an update section to the source instead of rewriting it.
    pub incremental: bool,

    pub dependency_check: DependencyCheck,

    /// Transform applied to strings and stream payloads after encoding.
    pub encryption: Option<Arc<dyn EncryptionAdapter>>,

    /// Header version, e.g. `1.7`.
    pub version: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression_level: -1,
            object_streams: false,
            container_capacity: 100,
            xref_form: XrefForm::Table,
            incremental: false,
            dependency_check: DependencyCheck::Structural,
            encryption: None,
            version: "1.7".to_string(),
        }
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConfig")
            .field("compression_level", &self.compression_level)
            .field("object_streams", &self.object_streams)
            .field("container_capacity", &self.container_capacity)
            .field("xref_form", &self.xref_form)
            .field("incremental", &self.incremental)
            .field("dependency_check", &self.dependency_check)
            .field("encryption", &self.encryption.is_some())
            .field("version", &self.version)
            .finish()
    }
}

impl WriterConfig {
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        self
    }

    pub fn with_container_capacity(mut self, capacity: usize) -> Self {
        self.container_capacity = capacity.max(1);
        self
    }

    pub fn with_xref_form(mut self, form: XrefForm) -> Self {
        self.xref_form = form;
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_dependency_check(mut self, check: DependencyCheck) -> Self {
        self.dependency_check = check;
        self
    }

    pub fn with_encryption(mut self, adapter: Arc<dyn EncryptionAdapter>) -> Self {
        self.encryption = Some(adapter);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Layout actually written, taking containers into account.
    pub fn effective_xref_form(&self) -> XrefForm {
        if self.object_streams {
            XrefForm::Stream
        } else {
            self.xref_form
        }
    }
}

/// Settings for opening a document.
#[derive(Clone, Default)]
pub struct ReaderConfig {
    /// Transform undone on strings and stream payloads when objects load.
    pub decryption: Option<Arc<dyn EncryptionAdapter>>,

    /// Fail on a damaged cross-reference section instead of scanning.
    pub strict: bool,
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("decryption", &self.decryption.is_some())
            .field("strict", &self.strict)
            .finish()
    }
}

impl ReaderConfig {
    pub fn with_decryption(mut self, adapter: Arc<dyn EncryptionAdapter>) -> Self {
        self.decryption = Some(adapter);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
