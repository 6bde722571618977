//! Shared fixtures: a seeded catalog database plus temp index and state
//! roots.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tempfile::TempDir;
use uuid::Uuid;

use cinesync::Settings;
use cinesync::source::to_sql_ts;

/// The upstream catalog schema: tracked tables expose `id` and a monotonic
/// `updated_at`; many-to-many relations go through junction tables.
const SCHEMA: &str = "
CREATE TABLE film_work (
    id TEXT PRIMARY KEY,
    title TEXT,
    description TEXT,
    rating REAL,
    updated_at TEXT NOT NULL
);
CREATE TABLE genre (
    id TEXT PRIMARY KEY,
    name TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE person (
    id TEXT PRIMARY KEY,
    full_name TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE genre_film_work (
    genre_id TEXT NOT NULL,
    film_work_id TEXT NOT NULL,
    PRIMARY KEY (genre_id, film_work_id)
);
CREATE TABLE person_film_work (
    person_id TEXT NOT NULL,
    film_work_id TEXT NOT NULL,
    role TEXT NOT NULL,
    PRIMARY KEY (person_id, film_work_id, role)
);
";

/// Deterministic uuid text for test entities.
pub fn uuid(n: u128) -> String {
    Uuid::from_u128(n).to_string()
}

/// Timestamps anchored well in the past so `default_is_now` scans skip
/// them.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub struct Fixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("catalog.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { dir, db_path }
    }

    pub fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.source.db_path = self.db_path.clone();
        settings.index.root = self.dir.path().join("index");
        settings.etl.state_path = self.dir.path().join("state.json");
        settings.etl.batch_size = 10;
        settings.etl.interval_secs = 0;
        settings
    }

    pub fn insert_movie(
        &self,
        id: &str,
        title: &str,
        description: Option<&str>,
        rating: Option<f64>,
        at: DateTime<Utc>,
    ) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO film_work (id, title, description, rating, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, title, description, rating, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn retitle_movie(&self, id: &str, title: &str, at: DateTime<Utc>) {
        self.conn()
            .execute(
                "UPDATE film_work SET title = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, title, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn touch_movie(&self, id: &str, at: DateTime<Utc>) {
        self.conn()
            .execute(
                "UPDATE film_work SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn insert_genre(&self, id: &str, name: &str, at: DateTime<Utc>) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO genre (id, name, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn rename_genre(&self, id: &str, name: &str, at: DateTime<Utc>) {
        self.conn()
            .execute(
                "UPDATE genre SET name = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, name, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn insert_person(&self, id: &str, full_name: &str, at: DateTime<Utc>) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO person (id, full_name, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, full_name, to_sql_ts(at)],
            )
            .unwrap();
    }

    pub fn link_genre(&self, genre_id: &str, film_id: &str) {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO genre_film_work (genre_id, film_work_id) VALUES (?1, ?2)",
                rusqlite::params![genre_id, film_id],
            )
            .unwrap();
    }

    pub fn link_person(&self, person_id: &str, film_id: &str, role: &str) {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO person_film_work (person_id, film_work_id, role) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![person_id, film_id, role],
            )
            .unwrap();
    }
}
