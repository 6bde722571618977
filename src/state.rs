//! Persisted watermark state for incremental scans.
//!
//! Each tracked `(index, table)` pair records the last processed
//! `updated_at` plus a fuzzy flag that forces an inclusive re-scan of
//! boundary timestamps after an interrupted run. The backing file is a
//! single JSON object, fully rewritten through a temp file and an atomic
//! rename on every update. An absent or corrupt file is the legitimate
//! "never synced" state, not an error.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StateResult<T> = Result<T, StateError>;

/// Identifies one tracked `(index, table)` scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatermarkKey {
    index: &'static str,
    table: &'static str,
}

impl WatermarkKey {
    pub fn new(index: &'static str, table: &'static str) -> Self {
        Self { index, table }
    }
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.table)
    }
}

/// High-water mark for one scan key.
///
/// `fuzzy = true` means rows sharing `last_updated` may still be
/// unprocessed and the next scan must use an inclusive comparator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub fuzzy: bool,
}

/// JSON-file-backed watermark store.
///
/// Single writer per process; every `set` re-reads, mutates, and atomically
/// rewrites the whole map so a crash never leaves a torn file behind.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the watermark for `key`, or `None` when the key has never
    /// been synced (including when the file is missing or unreadable).
    pub fn get(&self, key: &WatermarkKey) -> Option<Watermark> {
        self.read_all().remove(&key.to_string())
    }

    /// Persists `value` under `key`. Durable before return.
    pub fn set(&self, key: &WatermarkKey, value: Watermark) -> StateResult<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value);
        self.write_all(&all)
    }

    fn read_all(&self) -> BTreeMap<String, Watermark> {
        let Ok(bytes) = fs::read(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file is corrupt; continuing with empty state"
                );
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, map: &BTreeMap<String, Watermark>) -> StateResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })?;

        let json = serde_json::to_vec_pretty(map)?;

        // Temp file in the same directory so the final rename is atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })?;
        tmp.write_all(&json).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })?;
        tmp.persist(&self.path)
            .map_err(|e| StateError::Write {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let key = WatermarkKey::new("movies", "film_work");

        assert!(store.get(&key).is_none());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let key = WatermarkKey::new("movies", "genre");

        let wm = Watermark {
            last_updated: ts(1_700_000_000),
            fuzzy: true,
        };
        store.set(&key, wm).unwrap();

        assert_eq!(store.get(&key), Some(wm));
    }

    #[test]
    fn keys_are_independent_per_index() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let movies_genre = WatermarkKey::new("movies", "genre");
        let genres_genre = WatermarkKey::new("genres", "genre");

        store
            .set(
                &movies_genre,
                Watermark {
                    last_updated: ts(100),
                    fuzzy: false,
                },
            )
            .unwrap();

        assert!(store.get(&genres_genre).is_none());
        assert_eq!(store.get(&movies_genre).unwrap().last_updated, ts(100));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = WatermarkStore::new(&path);
        let key = WatermarkKey::new("persons", "person");

        assert!(store.get(&key).is_none());

        // A corrupt file must still accept new state.
        store
            .set(
                &key,
                Watermark {
                    last_updated: ts(42),
                    fuzzy: false,
                },
            )
            .unwrap();
        assert_eq!(store.get(&key).unwrap().last_updated, ts(42));
    }

    #[test]
    fn update_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path().join("state.json"));
        let a = WatermarkKey::new("movies", "film_work");
        let b = WatermarkKey::new("movies", "person");

        store
            .set(
                &a,
                Watermark {
                    last_updated: ts(1),
                    fuzzy: false,
                },
            )
            .unwrap();
        store
            .set(
                &b,
                Watermark {
                    last_updated: ts(2),
                    fuzzy: true,
                },
            )
            .unwrap();

        assert_eq!(store.get(&a).unwrap().last_updated, ts(1));
        assert_eq!(store.get(&b).unwrap().last_updated, ts(2));
        assert!(store.get(&b).unwrap().fuzzy);
    }
}
