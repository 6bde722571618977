//! Tantivy-backed search indexes, one per document kind.

pub mod analyzer;
pub mod error;
pub mod schema;
pub mod writer;

pub use error::{IndexError, IndexResult};
pub use schema::{DocKind, GenreFields, IndexDoc, MovieFields, PersonFields};
pub use writer::SearchIndex;
