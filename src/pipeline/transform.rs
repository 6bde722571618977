//! Row validation: raw denormalized rows in, typed domain objects out.
//!
//! A row that fails a required-field or id check raises a typed error
//! carrying the offending row id; the caller decides whether to drop the
//! batch or abort. Nothing is silently skipped here.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{FilmRef, Genre, GenreRef, Movie, Person, PersonRef};
use crate::source::{FilmEntry, GenreEntry, GenreRow, MovieRow, PersonEntry, PersonRow};

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("row {id}: missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("row {id}: invalid {field} id `{value}`: {source}")]
    InvalidId {
        id: String,
        field: &'static str,
        value: String,
        source: uuid::Error,
    },
}

fn parse_id(
    row_id: &str,
    field: &'static str,
    value: &str,
) -> Result<Uuid, TransformError> {
    Uuid::parse_str(value).map_err(|source| TransformError::InvalidId {
        id: row_id.to_string(),
        field,
        value: value.to_string(),
        source,
    })
}

fn required<T>(
    row_id: &str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, TransformError> {
    value.ok_or_else(|| TransformError::MissingField {
        id: row_id.to_string(),
        field,
    })
}

fn genre_ref(row_id: &str, entry: GenreEntry) -> Result<GenreRef, TransformError> {
    Ok(GenreRef {
        id: parse_id(row_id, "genre", &entry.id)?,
        name: required(row_id, "genre.name", entry.name)?,
    })
}

fn person_ref(row_id: &str, entry: PersonEntry) -> Result<PersonRef, TransformError> {
    Ok(PersonRef {
        id: parse_id(row_id, "person", &entry.id)?,
        full_name: required(row_id, "person.full_name", entry.full_name)?,
        role: required(row_id, "person.role", entry.role)?,
    })
}

fn film_ref(row_id: &str, entry: FilmEntry) -> Result<FilmRef, TransformError> {
    Ok(FilmRef {
        id: parse_id(row_id, "film_work", &entry.film_id)?,
        role: required(row_id, "film.role", entry.role)?,
    })
}

pub fn movie(row: MovieRow) -> Result<Movie, TransformError> {
    let id = parse_id(&row.id, "film_work", &row.id)?;
    let title = required(&row.id, "title", row.title)?;
    let description = required(&row.id, "description", row.description)?;
    let genres = row
        .genres
        .into_iter()
        .map(|g| genre_ref(&row.id, g))
        .collect::<Result<Vec<_>, _>>()?;
    let persons = row
        .persons
        .into_iter()
        .map(|p| person_ref(&row.id, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Movie {
        id,
        title,
        description,
        rating: row.rating,
        genres,
        persons,
    })
}

pub fn genre(row: GenreRow) -> Result<Genre, TransformError> {
    Ok(Genre {
        id: parse_id(&row.id, "genre", &row.id)?,
        name: required(&row.id, "name", row.name)?,
    })
}

pub fn person(row: PersonRow) -> Result<Person, TransformError> {
    let id = parse_id(&row.id, "person", &row.id)?;
    let full_name = required(&row.id, "full_name", row.full_name)?;
    let films = row
        .films
        .into_iter()
        .map(|f| film_ref(&row.id, f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Person {
        id,
        full_name,
        films,
    })
}

pub fn movies(rows: Vec<MovieRow>) -> Result<Vec<Movie>, TransformError> {
    rows.into_iter().map(movie).collect()
}

pub fn genres(rows: Vec<GenreRow>) -> Result<Vec<Genre>, TransformError> {
    rows.into_iter().map(genre).collect()
}

pub fn persons(rows: Vec<PersonRow>) -> Result<Vec<Person>, TransformError> {
    rows.into_iter().map(person).collect()
}
