//! End-to-end cycle behavior: scan, expand, enrich, transform, upsert.

mod common;

use chrono::{Duration, Utc};
use tantivy::schema::Value;

use cinesync::pipeline::DependencyExpander;
use cinesync::source::{Relation, SourceStore};
use cinesync::state::{WatermarkKey, WatermarkStore};
use cinesync::{Genre, Movie, Person, SearchIndex, Shutdown, SyncService};

use common::{Fixture, ts, uuid};

fn service(fx: &Fixture) -> SyncService {
    SyncService::new(fx.settings(), Shutdown::new())
}

fn movie_field(fx: &Fixture, id: &str, pick: fn(&cinesync::index::MovieFields) -> tantivy::schema::Field) -> String {
    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    let doc = index.fetch(id).unwrap().expect("document must exist");
    doc.get_first(pick(index.fields()))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn full_cycle_indexes_a_movie_with_children() {
    let fx = Fixture::new();
    let (m1, g1, p1) = (uuid(1), uuid(2), uuid(3));
    fx.insert_movie(&m1, "dune", Some("A desert planet."), Some(8.2), ts(10));
    fx.insert_genre(&g1, "scifi", ts(5));
    fx.insert_person(&p1, "Denis Villeneuve", ts(5));
    fx.link_genre(&g1, &m1);
    fx.link_person(&p1, &m1, "director");

    let stats = service(&fx).run_once().unwrap();
    assert!(stats.documents >= 3, "movie, genre, and person documents");

    // Movie document: uppercase derived title, nested children as JSON.
    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    assert_eq!(index.doc_count().unwrap(), 1);
    assert_eq!(movie_field(&fx, &m1, |f| f.title), "DUNE");
    let genres_json = movie_field(&fx, &m1, |f| f.genres);
    assert!(genres_json.contains("scifi"), "genres: {genres_json}");
    let directors_json = movie_field(&fx, &m1, |f| f.directors);
    assert!(directors_json.contains("Denis Villeneuve"));

    // Genre and person documents landed in their own indexes.
    let genres = SearchIndex::<Genre>::open(&fx.settings().index.root).unwrap();
    assert!(genres.fetch(&g1).unwrap().is_some());
    let persons = SearchIndex::<Person>::open(&fx.settings().index.root).unwrap();
    let person_doc = persons.fetch(&p1).unwrap().expect("person document");
    let films_json = person_doc
        .get_first(persons.fields().films)
        .and_then(|v| v.as_str())
        .unwrap();
    assert!(films_json.contains(&m1));
    assert!(films_json.contains("director"));
}

#[test]
fn second_cycle_updates_in_place_without_duplicates() {
    let fx = Fixture::new();
    let m1 = uuid(1);
    fx.insert_movie(&m1, "dune", Some("d"), None, ts(10));

    service(&fx).run_once().unwrap();
    assert_eq!(movie_field(&fx, &m1, |f| f.title), "DUNE");

    fx.retitle_movie(&m1, "dune part two", ts(100));
    service(&fx).run_once().unwrap();

    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    assert_eq!(index.doc_count().unwrap(), 1, "no duplicate documents");
    assert_eq!(movie_field(&fx, &m1, |f| f.title), "DUNE PART TWO");
}

#[test]
fn reindexing_unchanged_content_is_idempotent() {
    let fx = Fixture::new();
    let m1 = uuid(1);
    fx.insert_movie(&m1, "dune", Some("d"), Some(8.0), ts(10));

    service(&fx).run_once().unwrap();
    // Only the change timestamp moves; content is identical.
    fx.touch_movie(&m1, ts(60));
    service(&fx).run_once().unwrap();

    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    assert_eq!(index.doc_count().unwrap(), 1);
    assert_eq!(movie_field(&fx, &m1, |f| f.title), "DUNE");
}

#[test]
fn movie_without_children_gets_empty_collections() {
    let fx = Fixture::new();
    let m1 = uuid(1);
    fx.insert_movie(&m1, "solo", Some("no cast on file"), None, ts(10));

    service(&fx).run_once().unwrap();

    assert_eq!(movie_field(&fx, &m1, |f| f.genres), "[]");
    assert_eq!(movie_field(&fx, &m1, |f| f.directors), "[]");
    assert_eq!(movie_field(&fx, &m1, |f| f.actors), "[]");
    assert_eq!(movie_field(&fx, &m1, |f| f.writers), "[]");
}

#[test]
fn genre_change_refreshes_referencing_movies() {
    let fx = Fixture::new();
    let (m1, g1) = (uuid(1), uuid(2));
    fx.insert_movie(&m1, "dune", Some("d"), None, ts(10));
    fx.insert_genre(&g1, "scifi", ts(5));
    fx.link_genre(&g1, &m1);

    service(&fx).run_once().unwrap();
    assert!(movie_field(&fx, &m1, |f| f.genres).contains("scifi"));

    // Only the genre row changes; the movie's own updated_at stays put.
    // The rename lands after "now" so the movies-side genre scan sees it.
    fx.rename_genre(&g1, "science fiction", Utc::now() + Duration::hours(1));
    service(&fx).run_once().unwrap();

    let genres_json = movie_field(&fx, &m1, |f| f.genres);
    assert!(
        genres_json.contains("science fiction"),
        "movie document must be refreshed via dependency expansion: {genres_json}"
    );
}

#[test]
fn expansion_produces_distinct_root_set() {
    let fx = Fixture::new();
    let (m1, m2, g1, g2) = (uuid(1), uuid(2), uuid(11), uuid(12));
    fx.insert_movie(&m1, "a", Some("d"), None, ts(10));
    fx.insert_movie(&m2, "b", Some("d"), None, ts(10));
    fx.insert_genre(&g1, "one", ts(5));
    fx.insert_genre(&g2, "two", ts(5));
    fx.link_genre(&g1, &m1);
    fx.link_genre(&g1, &m2);
    fx.link_genre(&g2, &m2);

    let source = SourceStore::open(&fx.db_path).unwrap();
    let expander = DependencyExpander::new(&source, Relation::GenreToFilmWork, 10);

    let mut roots = Vec::new();
    expander
        .expand(&[g1.clone(), g2.clone()], |ids| {
            roots.extend(ids);
            Ok(())
        })
        .unwrap();
    assert_eq!(roots, vec![m1.clone(), m2.clone()]);

    // Input order must not matter.
    let mut reversed = Vec::new();
    expander
        .expand(&[g2, g1], |ids| {
            reversed.extend(ids);
            Ok(())
        })
        .unwrap();
    assert_eq!(reversed, vec![m1, m2]);
}

#[test]
fn validation_failure_drops_batch_but_scan_moves_on() {
    let fx = Fixture::new();
    let (bad, good) = (uuid(1), uuid(2));
    // NULL description fails required-field validation.
    fx.insert_movie(&bad, "broken", None, None, ts(5));
    fx.insert_movie(&good, "fine", Some("d"), None, ts(7));

    let mut settings = fx.settings();
    settings.etl.batch_size = 1; // one row per batch so only the bad batch drops
    let service = SyncService::new(settings, Shutdown::new());
    service.run_once().unwrap();

    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    assert!(index.fetch(&bad).unwrap().is_none(), "invalid row is not indexed");
    assert!(index.fetch(&good).unwrap().is_some(), "later batches still land");

    // The watermark passed the bad row: its refresh is lost until the row
    // changes again.
    let state = WatermarkStore::new(fx.settings().etl.state_path);
    let wm = state.get(&WatermarkKey::new("movies", "film_work")).unwrap();
    assert_eq!(wm.last_updated, ts(7));
    assert!(!wm.fuzzy);

    // Re-running stays clean and does not resurrect the dropped batch.
    service.run_once().unwrap();
    let index = SearchIndex::<Movie>::open(&fx.settings().index.root).unwrap();
    assert!(index.fetch(&bad).unwrap().is_none());
}

#[test]
fn person_roles_group_by_film_in_person_document() {
    let fx = Fixture::new();
    let (m1, p1) = (uuid(1), uuid(2));
    fx.insert_movie(&m1, "dune", Some("d"), None, ts(10));
    fx.insert_person(&p1, "Ann Writer", ts(5));
    fx.link_person(&p1, &m1, "actor");
    fx.link_person(&p1, &m1, "writer");

    service(&fx).run_once().unwrap();

    let persons = SearchIndex::<Person>::open(&fx.settings().index.root).unwrap();
    let doc = persons.fetch(&p1).unwrap().expect("person document");
    let films_json = doc
        .get_first(persons.fields().films)
        .and_then(|v| v.as_str())
        .unwrap();
    let films: serde_json::Value = serde_json::from_str(films_json).unwrap();
    let entries = films.as_array().unwrap();
    assert_eq!(entries.len(), 1, "one entry per film: {films_json}");
    let roles = entries[0]["roles"].as_array().unwrap();
    assert_eq!(roles.len(), 2);

    // The movie document carries the person under both role collections.
    assert!(movie_field(&fx, &m1, |f| f.actors).contains("Ann Writer"));
    assert!(movie_field(&fx, &m1, |f| f.writers).contains("Ann Writer"));
}
