//! SQLite-backed catalog access: change feeds, dependency expansion, and
//! the aggregating document queries.

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use super::error::{SourceError, SourceResult};
use super::rows::{
    FilmEntry, GenreEntry, GenreRow, MovieRow, PersonEntry, PersonRow, parse_aggregate,
};

/// Fixed-width UTC text for `updated_at` values; lexicographic order must
/// equal chronological order, so every timestamp goes through these two
/// helpers and nothing else.
const SQL_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn to_sql_ts(ts: DateTime<Utc>) -> String {
    ts.format(SQL_TS_FORMAT).to_string()
}

pub fn from_sql_ts(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SQL_TS_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Closed set of change-tracked source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedTable {
    FilmWork,
    Genre,
    Person,
}

impl TrackedTable {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::FilmWork => "film_work",
            Self::Genre => "genre",
            Self::Person => "person",
        }
    }
}

impl fmt::Display for TrackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Many-to-many relations that feed dependency expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    GenreToFilmWork,
    PersonToFilmWork,
}

impl Relation {
    fn junction(self) -> &'static str {
        match self {
            Self::GenreToFilmWork => "genre_film_work",
            Self::PersonToFilmWork => "person_film_work",
        }
    }

    fn fk_column(self) -> &'static str {
        match self {
            Self::GenreToFilmWork => "genre_id",
            Self::PersonToFilmWork => "person_id",
        }
    }
}

/// One page of the change feed, ordered ascending by `updated_at`.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// How a paged cursor finished.
#[derive(Debug, Clone, Copy)]
pub struct PageRun {
    pub pages: u64,
    /// False when the consumer stopped the cursor before it ran dry.
    pub drained: bool,
}

pub struct SourceStore {
    conn: Connection,
    path: PathBuf,
}

impl fmt::Debug for SourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SourceStore {
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streams ids changed after `threshold` (inclusive when the caller is
    /// in fuzzy mode) in ascending `updated_at` order, handing each page of
    /// at most `page_size` ids to `f` before the next page is pulled. The
    /// cursor is drained lazily, so a large backlog never materializes in
    /// memory at once.
    ///
    /// `f` returns `ControlFlow::Break` to stop after the current page.
    pub fn for_each_change_page<E, F>(
        &self,
        table: TrackedTable,
        threshold: DateTime<Utc>,
        inclusive: bool,
        page_size: usize,
        mut f: F,
    ) -> Result<PageRun, E>
    where
        E: From<SourceError>,
        F: FnMut(ChangePage) -> Result<ControlFlow<()>, E>,
    {
        let comparator = if inclusive { ">=" } else { ">" };
        let sql = format!(
            "SELECT id, updated_at FROM {table} \
             WHERE updated_at {comparator} ?1 \
             ORDER BY updated_at, id",
            table = table.as_sql(),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(SourceError::from)?;
        let mut rows = stmt
            .query([to_sql_ts(threshold)])
            .map_err(SourceError::from)?;

        let mut run = PageRun {
            pages: 0,
            drained: true,
        };
        loop {
            let mut ids = Vec::with_capacity(page_size);
            let mut last_raw: Option<String> = None;
            while ids.len() < page_size {
                let Some(row) = rows.next().map_err(SourceError::from)? else {
                    break;
                };
                ids.push(row.get::<_, String>(0).map_err(SourceError::from)?);
                last_raw = Some(row.get::<_, String>(1).map_err(SourceError::from)?);
            }
            let Some(raw) = last_raw else {
                break;
            };
            let last_updated = from_sql_ts(&raw).ok_or(SourceError::Timestamp {
                table: table.as_sql(),
                value: raw,
            })?;

            run.pages += 1;
            if f(ChangePage { ids, last_updated })?.is_break() {
                run.drained = false;
                break;
            }
        }
        debug!(table = %table, pages = run.pages, drained = run.drained, "change feed consumed");
        Ok(run)
    }

    /// Resolves the distinct set of `film_work` ids referencing any of
    /// `ids` through the relation's junction table.
    pub fn expand_root_ids(&self, relation: Relation, ids: &[String]) -> SourceResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT film_work_id FROM {junction} \
             WHERE {fk} IN ({placeholders}) \
             ORDER BY film_work_id",
            junction = relation.junction(),
            fk = relation.fk_column(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids), |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Fetches fully denormalized movie rows for up to one batch of ids in
    /// a single aggregating query. Children are grouped server-side so the
    /// left-join fan-out never reaches the caller; an entity with no
    /// children yields `[]`, never NULL.
    pub fn fetch_movie_rows(&self, ids: &[String]) -> SourceResult<Vec<MovieRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT \
                 fw.id, \
                 fw.title, \
                 fw.description, \
                 fw.rating, \
                 COALESCE(json_group_array(DISTINCT json_object( \
                     'id', g.id, 'name', g.name)) \
                     FILTER (WHERE g.id IS NOT NULL), '[]') AS genres, \
                 COALESCE(json_group_array(DISTINCT json_object( \
                     'id', p.id, 'full_name', p.full_name, 'role', pfw.role)) \
                     FILTER (WHERE p.id IS NOT NULL), '[]') AS persons \
             FROM film_work fw \
             LEFT JOIN genre_film_work gfw ON gfw.film_work_id = fw.id \
             LEFT JOIN genre g ON g.id = gfw.genre_id \
             LEFT JOIN person_film_work pfw ON pfw.film_work_id = fw.id \
             LEFT JOIN person p ON p.id = pfw.person_id \
             WHERE fw.id IN ({placeholders}) \
             GROUP BY fw.id \
             ORDER BY fw.id",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids), |row| {
            let id: String = row.get(0)?;
            let genres_raw: String = row.get(4)?;
            let persons_raw: String = row.get(5)?;
            Ok(MovieRow {
                genres: parse_aggregate::<GenreEntry>(&id, "genres", &genres_raw),
                persons: parse_aggregate::<PersonEntry>(&id, "persons", &persons_raw),
                title: row.get(1)?,
                description: row.get(2)?,
                rating: row.get(3)?,
                id,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Fetches genre rows for up to one batch of ids.
    pub fn fetch_genre_rows(&self, ids: &[String]) -> SourceResult<Vec<GenreRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name FROM genre WHERE id IN ({placeholders}) ORDER BY id",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids), |row| {
            Ok(GenreRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Fetches person rows with their flat (film, role) pairs aggregated
    /// server-side, one row per person.
    pub fn fetch_person_rows(&self, ids: &[String]) -> SourceResult<Vec<PersonRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT \
                 p.id, \
                 p.full_name, \
                 COALESCE(json_group_array(DISTINCT json_object( \
                     'film_id', fw.id, 'role', pfw.role)) \
                     FILTER (WHERE fw.id IS NOT NULL), '[]') AS films \
             FROM person p \
             LEFT JOIN person_film_work pfw ON pfw.person_id = p.id \
             LEFT JOIN film_work fw ON fw.id = pfw.film_work_id \
             WHERE p.id IN ({placeholders}) \
             GROUP BY p.id \
             ORDER BY p.id",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids), |row| {
            let id: String = row.get(0)?;
            let films_raw: String = row.get(2)?;
            Ok(PersonRow {
                films: parse_aggregate::<FilmEntry>(&id, "films", &films_raw),
                full_name: row.get(1)?,
                id,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
