//! Stream filter pipeline.
//!
//! - `params`: decode parameters (`Predictor`, `Colors`, `BitsPerComponent`,
//!   `Columns`, `EarlyChange`)
//! - `pipeline`: ordered filter chains and their encode/decode passes
//!
//! Filter and parameter values handed to the pipeline are already resolved:
//! the document dereferences indirect declarations at the moment of use.

pub mod params;
pub mod pipeline;

pub use params::DecodeParams;
pub use pipeline::{FilterChain, FilterStage};

use crate::error::{PdfError, Result};

/// Recognized stream filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    FlateDecode,
    LzwDecode,
    AsciiHexDecode,
    Ascii85Decode,
    RunLengthDecode,
    DctDecode,
    CcittFaxDecode,
    Jbig2Decode,
    JpxDecode,
    Crypt,
}

impl FilterKind {
    /// Parse a filter name, accepting the abbreviated inline-image forms.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "FlateDecode" | "Fl" => Self::FlateDecode,
            "LZWDecode" | "LZW" => Self::LzwDecode,
            "ASCIIHexDecode" | "AHx" => Self::AsciiHexDecode,
            "ASCII85Decode" | "A85" => Self::Ascii85Decode,
            "RunLengthDecode" | "RL" => Self::RunLengthDecode,
            "DCTDecode" | "DCT" => Self::DctDecode,
            "CCITTFaxDecode" | "CCF" => Self::CcittFaxDecode,
            "JBIG2Decode" => Self::Jbig2Decode,
            "JPXDecode" => Self::JpxDecode,
            "Crypt" => Self::Crypt,
            other => return Err(PdfError::UnsupportedFilter(other.to_string())),
        })
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::FlateDecode => "FlateDecode",
            Self::LzwDecode => "LZWDecode",
            Self::AsciiHexDecode => "ASCIIHexDecode",
            Self::Ascii85Decode => "ASCII85Decode",
            Self::RunLengthDecode => "RunLengthDecode",
            Self::DctDecode => "DCTDecode",
            Self::CcittFaxDecode => "CCITTFaxDecode",
            Self::Jbig2Decode => "JBIG2Decode",
            Self::JpxDecode => "JPXDecode",
            Self::Crypt => "Crypt",
        }
    }

    /// Image codecs whose bytes are carried without interpretation.
    pub const fn is_opaque(&self) -> bool {
        matches!(
            self,
            Self::DctDecode | Self::CcittFaxDecode | Self::Jbig2Decode | Self::JpxDecode
        )
    }

    /// Filters that honor the predictor parameters.
    pub const fn uses_predictor(&self) -> bool {
        matches!(self, Self::FlateDecode | Self::LzwDecode)
    }
}
