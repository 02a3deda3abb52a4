//! Reading side: tokenizer, object parser, cross-reference loading and the
//! lazy object source.
//!
//! - `lexer`: byte-level tokenizer
//! - `object_parser`: tokens to [`Node`](crate::model::Node) values
//! - `xref_reader`: cross-reference tables, streams and scan recovery
//! - `source`: on-demand materialization of single objects

pub mod lexer;
pub mod object_parser;
pub mod source;
pub mod xref_reader;

pub use lexer::{Lexer, Token};
pub use object_parser::ObjectParser;
pub use source::Source;
pub use xref_reader::{SourceEntry, XrefIndex};
