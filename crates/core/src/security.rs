//! Per-object encryption adapter.
//!
//! The adapter is a byte transform keyed by object identity. On write it runs
//! after the filter chain has encoded a payload; on read it runs before the
//! chain decodes. Key derivation from passwords is outside this crate: the
//! adapter is handed a ready file key.

use crate::codec::Arcfour;
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, Node, ObjectId};

/// Byte transform applied to strings and stream payloads of one object.
pub trait EncryptionAdapter: Send + Sync {
    fn encrypt_bytes(&self, id: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt_bytes(&self, id: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Dictionary written as the trailer's `/Encrypt` object.
    fn encrypt_dictionary(&self) -> Option<Dictionary> {
        None
    }
}

/// RC4 with the standard per-object key: the file key extended by the low
/// three bytes of the object number and low two bytes of the generation,
/// hashed with MD5 and cut to `min(key length + 5, 16)` bytes.
pub struct Rc4ObjectCipher {
    file_key: Vec<u8>,
    dictionary: Option<Dictionary>,
}

impl Rc4ObjectCipher {
    pub fn new(file_key: impl Into<Vec<u8>>) -> Result<Self> {
        let file_key = file_key.into();
        if file_key.is_empty() || file_key.len() > 16 {
            return Err(PdfError::EncryptionError(format!(
                "file key must be 1-16 bytes, got {}",
                file_key.len()
            )));
        }
        Ok(Self {
            file_key,
            dictionary: None,
        })
    }

    /// Attach the `/Encrypt` dictionary to emit in written files.
    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    fn object_key(&self, id: ObjectId) -> Vec<u8> {
        let mut key_data = self.file_key.clone();
        key_data.extend_from_slice(&id.number.to_le_bytes()[..3]);
        key_data.extend_from_slice(&id.generation.to_le_bytes());
        let hash = md5::compute(&key_data);
        let key_len = (self.file_key.len() + 5).min(16);
        hash.0[..key_len].to_vec()
    }

    fn apply(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        Ok(Arcfour::new(&self.object_key(id))?.process(data))
    }
}

impl EncryptionAdapter for Rc4ObjectCipher {
    fn encrypt_bytes(&self, id: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, plaintext)
    }

    fn decrypt_bytes(&self, id: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.apply(id, ciphertext)
    }

    fn encrypt_dictionary(&self) -> Option<Dictionary> {
        self.dictionary.clone()
    }
}

/// Rewrite every string nested in `node`, stream dictionaries included.
pub(crate) fn transform_strings(
    node: &mut Node,
    f: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>>,
) -> Result<()> {
    match node {
        Node::TextString(s) => *s = f(s)?,
        Node::Array(items) => {
            for item in items {
                transform_strings(item, f)?;
            }
        }
        Node::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                transform_strings(value, f)?;
            }
        }
        Node::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                transform_strings(value, f)?;
            }
        }
        _ => {}
    }
    Ok(())
}
