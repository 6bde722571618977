//! Document enrichment: one aggregating query per chunk of root ids, no
//! per-id round-trips.

use super::error::PipelineError;
use crate::source::{GenreRow, MovieRow, PersonRow, SourceResult, SourceStore};

/// Fetches denormalized rows for batches of entity ids and forwards each
/// page downstream. Generic over the row kind; the fetch function is fixed
/// at construction.
pub struct Enricher<'a, R> {
    source: &'a SourceStore,
    batch_size: usize,
    fetch: fn(&SourceStore, &[String]) -> SourceResult<Vec<R>>,
}

impl<'a, R> Enricher<'a, R> {
    /// Chunks `ids` to the batch size, runs one aggregating query per
    /// chunk, and hands each non-empty page of rows to `sink`. Returns the
    /// number of rows forwarded. Ids with no matching row are skipped
    /// silently (deleted upstream between scan and fetch).
    pub fn enrich<F>(&self, ids: &[String], mut sink: F) -> Result<usize, PipelineError>
    where
        F: FnMut(Vec<R>) -> Result<(), PipelineError>,
    {
        let mut total = 0;
        for chunk in ids.chunks(self.batch_size) {
            let rows = (self.fetch)(self.source, chunk)?;
            total += rows.len();
            if !rows.is_empty() {
                sink(rows)?;
            }
        }
        Ok(total)
    }
}

pub fn movie_enricher(source: &SourceStore, batch_size: usize) -> Enricher<'_, MovieRow> {
    Enricher {
        source,
        batch_size,
        fetch: SourceStore::fetch_movie_rows,
    }
}

pub fn genre_enricher(source: &SourceStore, batch_size: usize) -> Enricher<'_, GenreRow> {
    Enricher {
        source,
        batch_size,
        fetch: SourceStore::fetch_genre_rows,
    }
}

pub fn person_enricher(source: &SourceStore, batch_size: usize) -> Enricher<'_, PersonRow> {
    Enricher {
        source,
        batch_size,
        fetch: SourceStore::fetch_person_rows,
    }
}
