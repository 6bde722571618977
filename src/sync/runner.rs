//! Cycle loop and connection resilience.
//!
//! One `SyncService` drives every registered pipeline over shared store
//! handles. Transient failures drop the handles, back off, reopen, and
//! restart the cycle from its beginning; stage-local progress is discarded
//! because the watermarks only ever advance after fully-delivered pages,
//! so a restarted cycle re-derives exactly the unfinished work.

use std::cell::Cell;
use std::time::Duration;

use tracing::{error, info, warn};

use super::backoff::Backoff;
use crate::config::Settings;
use crate::index::{DocKind, SearchIndex};
use crate::model::{Genre, Movie, Person};
use crate::pipeline::{
    ChangeScanner, DependencyExpander, PipelineError, TransformError, genre_enricher,
    movie_enricher, person_enricher, transform,
};
use crate::shutdown::Shutdown;
use crate::source::{Relation, SourceStore, TrackedTable};
use crate::state::{WatermarkKey, WatermarkStore};

/// Resilience states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Connected,
    Retrying,
    Fatal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    /// Change pages forwarded by all scanners.
    pub pages: u64,
    /// Documents upserted across all indexes.
    pub documents: u64,
}

/// Long-lived store handles, replaced wholesale on reconnect.
struct Stores {
    source: SourceStore,
    movies: SearchIndex<Movie>,
    genres: SearchIndex<Genre>,
    persons: SearchIndex<Person>,
}

pub struct SyncService {
    settings: Settings,
    state: WatermarkStore,
    shutdown: Shutdown,
}

impl SyncService {
    pub fn new(settings: Settings, shutdown: Shutdown) -> Self {
        let state = WatermarkStore::new(&settings.etl.state_path);
        Self {
            settings,
            state,
            shutdown,
        }
    }

    fn open_stores(&self) -> Result<Stores, PipelineError> {
        let source = SourceStore::open(&self.settings.source.db_path)?;
        let root = &self.settings.index.root;
        Ok(Stores {
            source,
            movies: SearchIndex::open(root)?,
            genres: SearchIndex::open(root)?,
            persons: SearchIndex::open(root)?,
        })
    }

    /// Runs a single cycle against freshly opened stores and releases them.
    pub fn run_once(&self) -> Result<CycleStats, PipelineError> {
        let stores = self.open_stores()?;
        self.run_cycle(&stores)
    }

    /// Runs the cycle loop until shutdown or a fatal error.
    pub fn run(&self) -> Result<(), PipelineError> {
        let backoff = Backoff::from_config(&self.settings.backoff);
        let interval = Duration::from_secs(self.settings.etl.interval_secs);
        let mut stores: Option<Stores> = None;
        let mut attempt: u32 = 0;

        while !self.shutdown.is_requested() {
            if stores.is_none() {
                match self.open_stores() {
                    Ok(opened) => {
                        info!(state = ?LoopState::Connected, "source and index stores ready");
                        stores = Some(opened);
                        attempt = 0;
                    }
                    Err(e) if e.is_transient() && !backoff.exhausted(attempt) => {
                        let delay = backoff.delay(attempt);
                        warn!(
                            state = ?LoopState::Retrying,
                            error = %e,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "store acquisition failed; backing off"
                        );
                        attempt += 1;
                        self.sleep_with_shutdown(delay);
                        continue;
                    }
                    Err(e) => {
                        error!(state = ?LoopState::Fatal, error = %e, "store acquisition failed");
                        return Err(e);
                    }
                }
            }
            let Some(connected) = stores.as_ref() else {
                continue;
            };

            match self.run_cycle(connected) {
                Ok(stats) => {
                    attempt = 0;
                    info!(
                        pages = stats.pages,
                        documents = stats.documents,
                        "cycle complete"
                    );
                    self.sleep_with_shutdown(interval);
                }
                Err(e) if e.is_transient() && !backoff.exhausted(attempt) => {
                    let delay = backoff.delay(attempt);
                    warn!(
                        state = ?LoopState::Retrying,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure mid-cycle; reconnecting and restarting the cycle"
                    );
                    stores = None;
                    attempt += 1;
                    self.sleep_with_shutdown(delay);
                }
                Err(e) => {
                    error!(state = ?LoopState::Fatal, error = %e, "pipeline error");
                    return Err(e);
                }
            }
        }
        info!("shutdown requested; sync loop stopped");
        Ok(())
    }

    /// One full pass over every registered pipeline.
    fn run_cycle(&self, stores: &Stores) -> Result<CycleStats, PipelineError> {
        let batch = self.settings.etl.batch_size;
        let documents = Cell::new(0u64);
        let mut pages = 0u64;

        // movies: root scan plus dependency expansion for genre and person
        // changes. The related-table scans start from "now" on first run;
        // their backfill rides on the film_work root scan.
        let movie_rows = movie_enricher(&stores.source, batch);
        let refresh_movies = |ids: Vec<String>| -> Result<(), PipelineError> {
            movie_rows.enrich(&ids, |rows| {
                let Some(docs) = drop_invalid(transform::movies(rows)) else {
                    return Ok(());
                };
                documents.set(documents.get() + stores.movies.upsert_batch(&docs)? as u64);
                Ok(())
            })?;
            Ok(())
        };

        pages += self
            .scanner(stores, DocKind::Movies, TrackedTable::FilmWork, false)
            .scan(|ids| refresh_movies(ids))?
            .pages;
        if self.shutdown.is_requested() {
            return Ok(CycleStats {
                pages,
                documents: documents.get(),
            });
        }

        let by_genre = DependencyExpander::new(&stores.source, Relation::GenreToFilmWork, batch);
        pages += self
            .scanner(stores, DocKind::Movies, TrackedTable::Genre, true)
            .scan(|ids| by_genre.expand(&ids, |roots| refresh_movies(roots)).map(|_| ()))?
            .pages;

        let by_person = DependencyExpander::new(&stores.source, Relation::PersonToFilmWork, batch);
        pages += self
            .scanner(stores, DocKind::Movies, TrackedTable::Person, true)
            .scan(|ids| by_person.expand(&ids, |roots| refresh_movies(roots)).map(|_| ()))?
            .pages;
        if self.shutdown.is_requested() {
            return Ok(CycleStats {
                pages,
                documents: documents.get(),
            });
        }

        // genres
        let genre_rows = genre_enricher(&stores.source, batch);
        let refresh_genres = |ids: Vec<String>| -> Result<(), PipelineError> {
            genre_rows.enrich(&ids, |rows| {
                let Some(docs) = drop_invalid(transform::genres(rows)) else {
                    return Ok(());
                };
                documents.set(documents.get() + stores.genres.upsert_batch(&docs)? as u64);
                Ok(())
            })?;
            Ok(())
        };
        pages += self
            .scanner(stores, DocKind::Genres, TrackedTable::Genre, false)
            .scan(|ids| refresh_genres(ids))?
            .pages;
        if self.shutdown.is_requested() {
            return Ok(CycleStats {
                pages,
                documents: documents.get(),
            });
        }

        // persons
        let person_rows = person_enricher(&stores.source, batch);
        let refresh_persons = |ids: Vec<String>| -> Result<(), PipelineError> {
            person_rows.enrich(&ids, |rows| {
                let Some(docs) = drop_invalid(transform::persons(rows)) else {
                    return Ok(());
                };
                documents.set(documents.get() + stores.persons.upsert_batch(&docs)? as u64);
                Ok(())
            })?;
            Ok(())
        };
        pages += self
            .scanner(stores, DocKind::Persons, TrackedTable::Person, false)
            .scan(|ids| refresh_persons(ids))?
            .pages;

        Ok(CycleStats {
            pages,
            documents: documents.get(),
        })
    }

    fn scanner<'s>(
        &'s self,
        stores: &'s Stores,
        kind: DocKind,
        table: TrackedTable,
        default_is_now: bool,
    ) -> ChangeScanner<'s> {
        ChangeScanner::new(
            &stores.source,
            &self.state,
            WatermarkKey::new(kind.name(), table.as_sql()),
            table,
            default_is_now,
            self.settings.etl.batch_size,
            self.shutdown.clone(),
        )
    }

    fn sleep_with_shutdown(&self, total: Duration) {
        let step = Duration::from_millis(100);
        let mut remaining = total;
        while !remaining.is_zero() && !self.shutdown.is_requested() {
            let nap = remaining.min(step);
            std::thread::sleep(nap);
            remaining = remaining.saturating_sub(nap);
        }
    }
}

/// Validation failures drop the batch instead of aborting the cycle: the
/// originating scan has already advanced, so the refresh is lost until the
/// rows change again. Known, accepted imprecision.
fn drop_invalid<T>(result: Result<Vec<T>, TransformError>) -> Option<Vec<T>> {
    match result {
        Ok(docs) => Some(docs),
        Err(e) => {
            warn!(error = %e, "dropping batch that failed validation");
            None
        }
    }
}
