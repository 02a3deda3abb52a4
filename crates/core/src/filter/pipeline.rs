//! Filter chains.
//!
//! A chain is kept in application order: encoding runs the stages first to
//! last, so the last stage is the outermost transform of the stored bytes.
//! A stream's `/Filter` entry lists the outermost filter first, so converting
//! between the two reverses the list.

use super::{DecodeParams, FilterKind};
use crate::codec::{ascii85, flate, lzw, runlength};
use crate::error::{PdfError, Result};
use crate::model::{Node, Name};

/// One filter with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub kind: FilterKind,
    pub params: DecodeParams,
}

impl FilterStage {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            params: DecodeParams::default(),
        }
    }

    pub fn with_params(kind: FilterKind, params: DecodeParams) -> Self {
        Self { kind, params }
    }

    fn encode(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let predictor = &self.params.predictor;
        match self.kind {
            FilterKind::FlateDecode => {
                if predictor.is_identity() {
                    flate::deflate(data, level)
                } else {
                    flate::deflate(&predictor.encode(data)?, level)
                }
            }
            FilterKind::LzwDecode => {
                let predicted = predictor.encode(data)?;
                lzw::lzwencode_with_earlychange(&predicted, self.params.early_change)
            }
            FilterKind::AsciiHexDecode => Ok(ascii85::asciihexencode(data)),
            FilterKind::Ascii85Decode => Ok(ascii85::ascii85encode(data)),
            FilterKind::RunLengthDecode => Ok(runlength::rlencode(data)),
            _ => Ok(data.to_vec()),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let predictor = &self.params.predictor;
        match self.kind {
            FilterKind::FlateDecode => {
                let inflated = flate::inflate(data)?;
                if predictor.is_identity() {
                    Ok(inflated)
                } else {
                    predictor.decode(&inflated)
                }
            }
            FilterKind::LzwDecode => {
                let decoded = lzw::lzwdecode_with_earlychange(data, self.params.early_change)?;
                predictor.decode(&decoded)
            }
            FilterKind::AsciiHexDecode => ascii85::asciihexdecode(data),
            FilterKind::Ascii85Decode => ascii85::ascii85decode(data),
            FilterKind::RunLengthDecode => runlength::rldecode(data),
            _ => Ok(data.to_vec()),
        }
    }
}

/// Ordered filters of one stream, innermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single FlateDecode stage with default parameters.
    pub fn flate() -> Self {
        Self::new().then(FilterStage::new(FilterKind::FlateDecode))
    }

    /// Append a stage outside the existing ones.
    pub fn then(mut self, stage: FilterStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The transform applied last on encode and undone first on decode.
    pub fn outermost(&self) -> Option<&FilterStage> {
        self.stages.last()
    }

    pub fn contains(&self, kind: FilterKind) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }

    /// Build a chain from resolved `/Filter` and `/DecodeParms` values.
    ///
    /// Parameter entries may be `null` or missing; those stages use defaults.
    pub fn from_declaration(filter: Option<&Node>, parms: Option<&Node>) -> Result<Self> {
        let names: Vec<&str> = match filter {
            None | Some(Node::Null) => Vec::new(),
            Some(Node::Name(name)) => vec![name.as_str()],
            Some(Node::Array(items)) => items
                .iter()
                .map(|item| item.try_name())
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(PdfError::TypeError {
                    expected: "filter name or array",
                    got: other.type_name(),
                });
            }
        };

        let params: Vec<Option<DecodeParams>> = match parms {
            None | Some(Node::Null) => Vec::new(),
            Some(Node::Dictionary(dict)) => vec![Some(DecodeParams::from_dict(dict))],
            Some(Node::Array(items)) => items
                .iter()
                .map(|item| item.as_dict().map(DecodeParams::from_dict))
                .collect(),
            Some(_) => Vec::new(),
        };

        let mut stages = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = FilterKind::from_name(name)?;
                let params = params.get(i).cloned().flatten().unwrap_or_default();
                Ok(FilterStage::with_params(kind, params))
            })
            .collect::<Result<Vec<_>>>()?;
        stages.reverse();
        Ok(Self { stages })
    }

    /// `/Filter` and `/DecodeParms` values for this chain, outermost first.
    /// Parameters are omitted when every stage uses its defaults.
    pub fn declaration(&self) -> (Option<Node>, Option<Node>) {
        let decode_order: Vec<&FilterStage> = self.stages.iter().rev().collect();
        let filter = match decode_order.as_slice() {
            [] => None,
            [single] => Some(Node::Name(Name::new(single.kind.name()))),
            many => Some(Node::Array(
                many.iter()
                    .map(|s| Node::Name(Name::new(s.kind.name())))
                    .collect(),
            )),
        };

        let parms = if decode_order.iter().all(|s| s.params.is_default()) {
            None
        } else if let [single] = decode_order.as_slice() {
            Some(Node::Dictionary(single.params.to_dict()))
        } else {
            Some(Node::Array(
                decode_order
                    .iter()
                    .map(|s| {
                        if s.params.is_default() {
                            Node::Null
                        } else {
                            Node::Dictionary(s.params.to_dict())
                        }
                    })
                    .collect(),
            ))
        };
        (filter, parms)
    }

    /// Logical bytes to stored bytes.
    pub fn encode(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        for stage in &self.stages {
            buf = stage.encode(&buf, level)?;
        }
        Ok(buf)
    }

    /// Stored bytes to logical bytes.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        for stage in self.stages.iter().rev() {
            buf = stage.decode(&buf)?;
        }
        Ok(buf)
    }
}
