//! Decode parameter dictionaries.

use crate::codec::Predictor;
use crate::model::{Dictionary, Name};

/// Parameters for one filter stage. Missing keys take the filter defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    pub predictor: Predictor,
    pub early_change: i64,
    /// Crypt filter name (`/Name`), `Identity` when absent.
    pub crypt_name: Option<Name>,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: Predictor::default(),
            early_change: 1,
            crypt_name: None,
        }
    }
}

impl DecodeParams {
    pub fn from_dict(dict: &Dictionary) -> Self {
        let defaults = Self::default();
        let count = |key: &str, default: usize| {
            dict.get_i64(key)
                .filter(|&v| v > 0)
                .map_or(default, |v| v as usize)
        };
        Self {
            predictor: Predictor {
                kind: dict.get_i64("Predictor").unwrap_or(defaults.predictor.kind),
                colors: count("Colors", defaults.predictor.colors),
                bits_per_component: count(
                    "BitsPerComponent",
                    defaults.predictor.bits_per_component,
                ),
                columns: count("Columns", defaults.predictor.columns),
            },
            early_change: dict.get_i64("EarlyChange").unwrap_or(defaults.early_change),
            crypt_name: dict.get_name("Name").map(Name::new),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Dictionary holding only the keys that differ from the defaults.
    pub fn to_dict(&self) -> Dictionary {
        let defaults = Predictor::default();
        let mut dict = Dictionary::new();
        if self.predictor.kind != defaults.kind {
            dict.insert("Predictor", self.predictor.kind);
        }
        if self.predictor.colors != defaults.colors {
            dict.insert("Colors", self.predictor.colors);
        }
        if self.predictor.bits_per_component != defaults.bits_per_component {
            dict.insert("BitsPerComponent", self.predictor.bits_per_component);
        }
        if self.predictor.columns != defaults.columns {
            dict.insert("Columns", self.predictor.columns);
        }
        if self.early_change != 1 {
            dict.insert("EarlyChange", self.early_change);
        }
        if let Some(name) = &self.crypt_name {
            dict.insert("Name", crate::model::Node::Name(name.clone()));
        }
        dict
    }
}
