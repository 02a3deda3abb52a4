//! ASCII85 and ASCIIHex coding.
//!
//! Decoders are lenient: whitespace and stray characters are skipped and a
//! missing end-of-data marker is accepted.

use crate::error::Result;

/// Decode ASCII85 data (PDF variant with `z` shorthand and `~>` terminator).
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5 + 4);
    let mut group = [0u8; 5];
    let mut filled = 0;
    for &byte in data {
        match byte {
            b'z' if filled == 0 => result.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
                if filled == 5 {
                    result.extend_from_slice(&group_value(&group).to_be_bytes());
                    filled = 0;
                }
            }
            _ => continue,
        }
    }

    // A final partial group of n characters carries n - 1 bytes.
    if filled > 1 {
        for slot in group.iter_mut().skip(filled) {
            *slot = b'u' - b'!';
        }
        let bytes = group_value(&group).to_be_bytes();
        result.extend_from_slice(&bytes[..filled - 1]);
    }

    Ok(result)
}

fn group_value(digits: &[u8; 5]) -> u32 {
    digits
        .iter()
        .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(d as u32))
}

/// Encode data as ASCII85, terminated with `~>`.
pub fn ascii85encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 8);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if value == 0 {
            out.push(b'z');
        } else {
            out.extend_from_slice(&encode_group(value));
        }
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = [0u8; 4];
        padded[..rest.len()].copy_from_slice(rest);
        let digits = encode_group(u32::from_be_bytes(padded));
        out.extend_from_slice(&digits[..rest.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

fn encode_group(mut value: u32) -> [u8; 5] {
    let mut digits = [0u8; 5];
    for slot in digits.iter_mut().rev() {
        *slot = (value % 85) as u8 + b'!';
        value /= 85;
    }
    digits
}

/// Decode ASCIIHex data. An odd trailing digit is padded with zero.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b'>' => break,
            _ => continue,
        };

        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Encode data as uppercase hex digits terminated with `>`.
pub fn asciihexencode(data: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &b in data {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0f) as usize]);
    }
    out.push(b'>');
    out
}
