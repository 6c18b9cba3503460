//! Document serialization.
//!
//! [`serializer`] turns individual objects into bytes; [`pdf_writer`]
//! assembles a whole [`crate::document::Document`] into a flat file with a
//! classic xref table, reporting the byte offset of every object so callers
//! can patch values in place afterwards.

pub mod pdf_writer;
pub mod serializer;

pub use pdf_writer::{PdfWriter, WrittenDocument};
pub use serializer::ObjectSerializer;
