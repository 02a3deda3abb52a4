//! Deflate (zlib) compression for FlateDecode streams.

use crate::error::{PdfError, Result};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Compression level used when the caller asks for the default (-1).
pub const DEFAULT_LEVEL: u32 = 6;

fn compression_for(level: i32) -> Compression {
    match level {
        l if l < 0 => Compression::new(DEFAULT_LEVEL),
        l => Compression::new(l.min(9) as u32),
    }
}

/// Compress with zlib framing. Level 0 stores, 9 is maximum, -1 default.
pub fn deflate(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), compression_for(level));
    encoder
        .write_all(data)
        .map_err(|e| PdfError::EncodeError(format!("deflate: {e}")))?;
    encoder
        .finish()
        .map_err(|e| PdfError::EncodeError(format!("deflate: {e}")))
}

/// Decompress zlib data, recovering what precedes a corrupt tail.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(err) => {
            let partial = inflate_lenient(data);
            if partial.is_empty() {
                Err(PdfError::DecodeError(format!("inflate: {err}")))
            } else {
                tracing::warn!(
                    recovered = partial.len(),
                    "corrupt flate data, keeping partial output"
                );
                Ok(partial)
            }
        }
    }
}

/// Feed the decoder one byte at a time and keep everything produced before
/// the first error (often a bad checksum near the end).
fn inflate_lenient(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};

    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_level_still_inflates() {
        let data = b"stored block payload".repeat(10);
        let stored = deflate(&data, 0).unwrap();
        assert!(stored.len() > data.len());
        assert_eq!(inflate(&stored).unwrap(), data);
    }

    #[test]
    fn truncated_checksum_keeps_payload() {
        let data = b"BT /F1 12 Tf (hello) Tj ET".to_vec();
        let mut compressed = deflate(&data, 9).unwrap();
        compressed.truncate(compressed.len() - 4);
        assert_eq!(inflate(&compressed).unwrap(), data);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            inflate(b"\x00\x01not zlib"),
            Err(PdfError::DecodeError(_))
        ));
    }
}
