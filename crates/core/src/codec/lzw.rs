//! LZW coding for LZWDecode streams, backed by weezl.
//!
//! PDF uses MSB-first codes starting at 9 bits. With `EarlyChange` 1 (the
//! default) the code width grows one code early, which is the TIFF variant.

use crate::error::{PdfError, Result};
use weezl::{BitOrder, decode::Decoder, encode::Encoder};

/// Decode LZW data with the default `EarlyChange` of 1.
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW data; truncated or corrupt input yields the bytes decoded so far.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = result.status {
        tracing::debug!(%err, decoded = output.len(), "lzw stream ended early");
    }
    Ok(output)
}

/// Encode data as LZW, including the end-of-data code.
pub fn lzwencode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut encoder = if early_change == 0 {
        Encoder::new(BitOrder::Msb, 8)
    } else {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::with_capacity(data.len() / 2 + 8);
    encoder
        .into_vec(&mut output)
        .encode_all(data)
        .status
        .map_err(|e| PdfError::EncodeError(format!("lzw: {e}")))?;
    Ok(output)
}
