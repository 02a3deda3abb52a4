//! RunLength (PackBits) coding.
//!
//! Length byte 0-127 copies the next length + 1 bytes, 129-255 repeats the
//! next byte 257 - length times, 128 ends the data.

use crate::error::Result;

const EOD: u8 = 128;
const MAX_RUN: usize = 128;

/// Decode RunLength data. Truncated input stops decoding without error.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            EOD => break,
            0..=127 => {
                let count = length as usize + 1;
                if i + count > data.len() {
                    result.extend_from_slice(&data[i..]);
                    break;
                }
                result.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else { break };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
            }
        }
    }

    Ok(result)
}

/// Encode data as RunLength, terminated by the EOD byte.
pub fn rlencode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 2);
    let mut i = 0;

    while i < data.len() {
        let run = data[i..]
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| b == data[i])
            .count();
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }

        // Literal run up to the next pair of repeated bytes.
        let start = i;
        while i < data.len() && i - start < MAX_RUN {
            if i + 1 < data.len() && data[i] == data[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }

    out.push(EOD);
    out
}
