//! Read-side access to the relational movie catalog.

pub mod error;
pub mod rows;
pub mod store;

pub use error::{SourceError, SourceResult};
pub use rows::{FilmEntry, GenreEntry, GenreRow, MovieRow, PersonEntry, PersonRow};
pub use store::{ChangePage, PageRun, Relation, SourceStore, TrackedTable, from_sql_ts, to_sql_ts};
