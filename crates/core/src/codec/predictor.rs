//! Predictor pre/post-processing for Flate and LZW payloads.
//!
//! Predictor 2 is the TIFF horizontal differencing predictor, 10-15 are the
//! PNG row filters (15 lets the encoder pick a filter per row).

use crate::error::{PdfError, Result};

/// Predictor parameters taken from a filter's decode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predictor {
    pub kind: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            kind: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl Predictor {
    pub const fn is_identity(&self) -> bool {
        self.kind <= 1
    }

    /// Bytes in one row of samples, rounded up to whole bytes.
    pub fn row_bytes(&self) -> Result<usize> {
        self.colors
            .checked_mul(self.columns)
            .and_then(|n| n.checked_mul(self.bits_per_component))
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| {
                PdfError::DecodeError(format!(
                    "predictor row of {} columns x {} colors x {} bits is too large",
                    self.columns, self.colors, self.bits_per_component
                ))
            })
    }

    const fn bytes_per_pixel(&self) -> usize {
        let bpp = self.colors.saturating_mul(self.bits_per_component) / 8;
        if bpp == 0 { 1 } else { bpp }
    }

    /// Apply the predictor before compression.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            k if k <= 1 => Ok(data.to_vec()),
            2 => self.tiff(data, true),
            10..=15 => self.png_encode(data),
            k => Err(PdfError::EncodeError(format!("unsupported predictor {k}"))),
        }
    }

    /// Undo the predictor after decompression.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            k if k <= 1 => Ok(data.to_vec()),
            2 => self.tiff(data, false),
            10..=15 => self.png_decode(data),
            k => Err(PdfError::DecodeError(format!("unsupported predictor {k}"))),
        }
    }

    fn tiff(&self, data: &[u8], encode: bool) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        if row_bytes == 0 {
            return Ok(data.to_vec());
        }
        let mut out = data.to_vec();
        match self.bits_per_component {
            8 => {
                let stride = self.colors;
                for row in out.chunks_mut(row_bytes) {
                    if encode {
                        for i in (stride..row.len()).rev() {
                            row[i] = row[i].wrapping_sub(row[i - stride]);
                        }
                    } else {
                        for i in stride..row.len() {
                            row[i] = row[i].wrapping_add(row[i - stride]);
                        }
                    }
                }
            }
            16 => {
                let stride = self.colors * 2;
                for row in out.chunks_mut(row_bytes) {
                    let sample = |row: &[u8], i: usize| u16::from_be_bytes([row[i], row[i + 1]]);
                    let last = row.len() - row.len() % 2;
                    if encode {
                        let mut i = last;
                        while i >= stride + 2 {
                            i -= 2;
                            let v = sample(row, i).wrapping_sub(sample(row, i - stride));
                            row[i..i + 2].copy_from_slice(&v.to_be_bytes());
                        }
                    } else {
                        let mut i = stride;
                        while i + 2 <= last {
                            let v = sample(row, i).wrapping_add(sample(row, i - stride));
                            row[i..i + 2].copy_from_slice(&v.to_be_bytes());
                            i += 2;
                        }
                    }
                }
            }
            bpc => {
                return Err(PdfError::DecodeError(format!(
                    "TIFF predictor with {bpc} bits per component"
                )));
            }
        }
        Ok(out)
    }

    fn png_encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        if row_bytes == 0 {
            return Ok(data.to_vec());
        }
        let bpp = self.bytes_per_pixel();
        let mut out = Vec::with_capacity(data.len() + data.len() / row_bytes + 1);
        // No row is longer than the data.
        let mut prev = vec![0u8; row_bytes.min(data.len())];
        let mut filtered = vec![0u8; row_bytes.min(data.len())];

        for row in data.chunks(row_bytes) {
            let filter = if self.kind == 15 {
                best_filter(row, &prev, bpp)
            } else {
                (self.kind - 10) as u8
            };
            apply_filter(filter, row, &prev, bpp, &mut filtered[..row.len()]);
            out.push(filter);
            out.extend_from_slice(&filtered[..row.len()]);
            prev[..row.len()].copy_from_slice(row);
        }
        Ok(out)
    }

    fn png_decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        if row_bytes == 0 {
            return Ok(data.to_vec());
        }
        let bpp = self.bytes_per_pixel();
        let mut result = Vec::with_capacity(data.len());
        let mut prev = vec![0u8; row_bytes.min(data.len())];
        let mut current = vec![0u8; row_bytes.min(data.len())];

        // A short final row is decoded over the bytes present.
        for chunk in data.chunks(row_bytes.saturating_add(1)) {
            let Some((&filter, row)) = chunk.split_first() else {
                break;
            };
            let len = row.len();
            for i in 0..len {
                let left = if i >= bpp { current[i - bpp] } else { 0 };
                let above = prev[i];
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                let predicted = match filter {
                    1 => left,
                    2 => above,
                    3 => ((left as u16 + above as u16) / 2) as u8,
                    4 => paeth_predictor(left, above, upper_left),
                    _ => 0,
                };
                current[i] = row[i].wrapping_add(predicted);
            }
            result.extend_from_slice(&current[..len]);
            std::mem::swap(&mut prev, &mut current);
        }

        Ok(result)
    }
}

fn apply_filter(filter: u8, row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) {
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let above = prev[i];
        let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
        let predicted = match filter {
            1 => left,
            2 => above,
            3 => ((left as u16 + above as u16) / 2) as u8,
            4 => paeth_predictor(left, above, upper_left),
            _ => 0,
        };
        out[i] = row[i].wrapping_sub(predicted);
    }
}

/// Pick the filter with the smallest sum of absolute signed residuals.
fn best_filter(row: &[u8], prev: &[u8], bpp: usize) -> u8 {
    let mut scratch = vec![0u8; row.len()];
    (0..=4u8)
        .min_by_key(|&filter| {
            apply_filter(filter, row, prev, bpp, &mut scratch);
            scratch
                .iter()
                .map(|&b| (b as i8).unsigned_abs() as u64)
                .sum::<u64>()
        })
        .unwrap_or(0)
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}
