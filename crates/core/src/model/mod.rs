//! PDF object model.
//!
//! - `objects` - graph nodes (Node, Dictionary, Stream, ObjectId)
//! - `serialize` - canonical PDF syntax for nodes

pub mod objects;
pub mod serialize;

pub use objects::{Dictionary, Name, Node, ObjectId, Stream};
