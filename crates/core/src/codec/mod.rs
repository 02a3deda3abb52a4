//! Byte-level codecs behind the stream filters.
//!
//! - `flate`: zlib deflate/inflate
//! - `lzw`: LZW coding
//! - `ascii85`: ASCII85 and ASCIIHex coding
//! - `runlength`: RunLength coding
//! - `predictor`: TIFF and PNG predictors
//! - `arcfour`: RC4 cipher

pub mod arcfour;
pub mod ascii85;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use arcfour::Arcfour;
pub use ascii85::{ascii85decode, ascii85encode, asciihexdecode, asciihexencode};
pub use flate::{deflate, inflate};
pub use lzw::{lzwdecode, lzwdecode_with_earlychange, lzwencode_with_earlychange};
pub use predictor::Predictor;
pub use runlength::{rldecode, rlencode};
