//! Raw denormalized rows as returned by the aggregate queries.
//!
//! Child collections arrive as JSON arrays built server-side. Field-level
//! validation happens later in the transform stage; here the only rule is
//! that a malformed aggregate degrades to an empty collection instead of
//! failing the batch.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// One aggregated `film_work` row.
#[derive(Debug, Clone)]
pub struct MovieRow {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub genres: Vec<GenreEntry>,
    pub persons: Vec<PersonEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenreEntry {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PersonEntry {
    pub id: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// One `genre` row.
#[derive(Debug, Clone)]
pub struct GenreRow {
    pub id: String,
    pub name: Option<String>,
}

/// One aggregated `person` row with flat (film, role) pairs.
#[derive(Debug, Clone)]
pub struct PersonRow {
    pub id: String,
    pub full_name: Option<String>,
    pub films: Vec<FilmEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilmEntry {
    pub film_id: String,
    pub role: Option<String>,
}

/// Parses a JSON child aggregate, degrading to an empty collection when
/// the payload is malformed.
pub(crate) fn parse_aggregate<T: DeserializeOwned>(row_id: &str, field: &str, raw: &str) -> Vec<T> {
    match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                row = row_id,
                field,
                error = %e,
                "malformed child aggregate; treating as empty"
            );
            Vec::new()
        }
    }
}
