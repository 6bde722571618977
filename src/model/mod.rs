//! Validated domain objects and their index-document shapes.
//!
//! Instances are produced by the transform stage, owned by the pipeline
//! for exactly one batch, and dropped after the index write.

use serde::Serialize;
use uuid::Uuid;

pub const ROLE_ACTOR: &str = "actor";
pub const ROLE_DIRECTOR: &str = "director";
pub const ROLE_WRITER: &str = "writer";

/// A movie with its denormalized child collections.
#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub rating: Option<f64>,
    pub genres: Vec<GenreRef>,
    pub persons: Vec<PersonRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonRef {
    pub id: Uuid,
    pub full_name: String,
    pub role: String,
}

/// Person entry as embedded in a movie document; the role is carried by
/// the surrounding collection (directors/actors/writers), not the entry.
#[derive(Debug, Serialize)]
pub struct PersonDocEntry<'a> {
    pub id: &'a Uuid,
    pub full_name: &'a str,
}

impl PersonRef {
    pub fn doc_entry(&self) -> PersonDocEntry<'_> {
        PersonDocEntry {
            id: &self.id,
            full_name: &self.full_name,
        }
    }
}

impl Movie {
    pub fn persons_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a PersonRef> {
        self.persons.iter().filter(move |p| p.role == role)
    }

    /// Derived title required by the read API: always uppercase.
    pub fn display_title(&self) -> String {
        self.title.to_uppercase()
    }
}

/// A standalone genre document.
#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
}

/// A person with the flat (film, role) pairs they are credited on.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub films: Vec<FilmRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilmRef {
    pub id: Uuid,
    pub role: String,
}

/// Film entry as embedded in a person document: one entry per film,
/// roles collected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilmRoles {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl Person {
    /// Groups the flat credit pairs by film id, preserving first-seen film
    /// order and credit order within a film.
    pub fn films_grouped(&self) -> Vec<FilmRoles> {
        let mut grouped: Vec<FilmRoles> = Vec::new();
        for film in &self.films {
            match grouped.iter_mut().find(|g| g.id == film.id) {
                Some(entry) => {
                    if !entry.roles.contains(&film.role) {
                        entry.roles.push(film.role.clone());
                    }
                }
                None => grouped.push(FilmRoles {
                    id: film.id,
                    roles: vec![film.role.clone()],
                }),
            }
        }
        grouped
    }
}
