//! Operation map document parsing
//!
//! Turns YAML text into validated [`Operation`](crate::model::Operation)
//! values. Nothing here touches the file system; see [`crate::loader`].

pub mod document;
pub mod inline;

pub use document::{parse_document, parse_record};
pub use inline::extract_inline_records;
