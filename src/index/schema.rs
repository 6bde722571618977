//! Per-kind index schemas and the bridge from domain objects to tantivy
//! documents.
//!
//! The set of document kinds is closed: each kind resolves to its schema,
//! fields, and document shape once at pipeline construction, never through
//! a name lookup per batch.

use std::fmt;
use std::str::FromStr;

use tantivy::TantivyDocument;
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, STORED, STRING, Schema, SchemaBuilder,
    TextFieldIndexing, TextOptions,
};

use super::analyzer::RU_EN;
use crate::model::{Genre, Movie, Person, ROLE_ACTOR, ROLE_DIRECTOR, ROLE_WRITER};

/// Closed set of target document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    Movies,
    Genres,
    Persons,
}

impl DocKind {
    pub const ALL: [DocKind; 3] = [DocKind::Movies, DocKind::Genres, DocKind::Persons];

    /// Index name; doubles as the directory name under the index root.
    pub fn name(self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Genres => "genres",
            Self::Persons => "persons",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(Self::Movies),
            "genres" => Ok(Self::Genres),
            "persons" => Ok(Self::Persons),
            other => Err(format!(
                "unknown index `{other}` (expected movies, genres, or persons)"
            )),
        }
    }
}

/// Full-text options with the shared multi-language analyzer.
fn ru_en_text() -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(RU_EN)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored()
}

/// Bridges a domain object to its tantivy representation.
pub trait IndexDoc: Sized {
    type Fields;

    const KIND: DocKind;

    fn build_schema() -> (Schema, Self::Fields);

    /// The keyword field that carries the stable document id; upserts
    /// delete on this term before re-adding.
    fn id_field(fields: &Self::Fields) -> Field;

    /// Default fields for free-text queries against this kind.
    fn search_fields(fields: &Self::Fields) -> Vec<Field>;

    fn id_text(&self) -> String;

    fn write_into(
        &self,
        fields: &Self::Fields,
        doc: &mut TantivyDocument,
    ) -> Result<(), serde_json::Error>;
}

/// Schema fields for the movies index.
///
/// Child collections are serialized into stored JSON payloads for
/// retrieval, with flattened name fields carrying the searchable text.
#[derive(Debug)]
pub struct MovieFields {
    pub id: Field,
    pub title: Field,
    pub description: Field,
    pub rating: Field,
    pub genres: Field,
    pub genre_names: Field,
    pub directors: Field,
    pub actors: Field,
    pub writers: Field,
    pub actors_names: Field,
    pub writers_names: Field,
}

impl IndexDoc for Movie {
    type Fields = MovieFields;

    const KIND: DocKind = DocKind::Movies;

    fn build_schema() -> (Schema, MovieFields) {
        let mut builder = SchemaBuilder::default();

        let id = builder.add_text_field("id", STRING | STORED);
        let title = builder.add_text_field("title", ru_en_text());
        let description = builder.add_text_field("description", ru_en_text());
        let rating = builder.add_f64_field(
            "rating",
            NumericOptions::default().set_stored().set_fast(),
        );

        // Stored JSON payloads for nested collections
        let genres = builder.add_text_field("genres", STORED);
        let directors = builder.add_text_field("directors", STORED);
        let actors = builder.add_text_field("actors", STORED);
        let writers = builder.add_text_field("writers", STORED);

        // Searchable flattened child text
        let genre_names = builder.add_text_field("genre_names", ru_en_text());
        let actors_names = builder.add_text_field("actors_names", ru_en_text());
        let writers_names = builder.add_text_field("writers_names", ru_en_text());

        let schema = builder.build();
        let fields = MovieFields {
            id,
            title,
            description,
            rating,
            genres,
            genre_names,
            directors,
            actors,
            writers,
            actors_names,
            writers_names,
        };
        (schema, fields)
    }

    fn id_field(fields: &MovieFields) -> Field {
        fields.id
    }

    fn search_fields(fields: &MovieFields) -> Vec<Field> {
        vec![
            fields.title,
            fields.description,
            fields.genre_names,
            fields.actors_names,
            fields.writers_names,
        ]
    }

    fn id_text(&self) -> String {
        self.id.to_string()
    }

    fn write_into(
        &self,
        fields: &MovieFields,
        doc: &mut TantivyDocument,
    ) -> Result<(), serde_json::Error> {
        doc.add_text(fields.id, self.id_text());
        doc.add_text(fields.title, self.display_title());
        doc.add_text(fields.description, &self.description);
        if let Some(rating) = self.rating {
            doc.add_f64(fields.rating, rating);
        }

        doc.add_text(fields.genres, serde_json::to_string(&self.genres)?);
        for genre in &self.genres {
            doc.add_text(fields.genre_names, &genre.name);
        }

        for (role, json_field, names_field) in [
            (ROLE_DIRECTOR, fields.directors, None),
            (ROLE_ACTOR, fields.actors, Some(fields.actors_names)),
            (ROLE_WRITER, fields.writers, Some(fields.writers_names)),
        ] {
            let entries: Vec<_> = self
                .persons_with_role(role)
                .map(|p| p.doc_entry())
                .collect();
            doc.add_text(json_field, serde_json::to_string(&entries)?);
            if let Some(names_field) = names_field {
                for person in self.persons_with_role(role) {
                    doc.add_text(names_field, &person.full_name);
                }
            }
        }
        Ok(())
    }
}

/// Schema fields for the genres index.
#[derive(Debug)]
pub struct GenreFields {
    pub id: Field,
    pub name: Field,
}

impl IndexDoc for Genre {
    type Fields = GenreFields;

    const KIND: DocKind = DocKind::Genres;

    fn build_schema() -> (Schema, GenreFields) {
        let mut builder = SchemaBuilder::default();
        let id = builder.add_text_field("id", STRING | STORED);
        let name = builder.add_text_field("name", ru_en_text());
        (builder.build(), GenreFields { id, name })
    }

    fn id_field(fields: &GenreFields) -> Field {
        fields.id
    }

    fn search_fields(fields: &GenreFields) -> Vec<Field> {
        vec![fields.name]
    }

    fn id_text(&self) -> String {
        self.id.to_string()
    }

    fn write_into(
        &self,
        fields: &GenreFields,
        doc: &mut TantivyDocument,
    ) -> Result<(), serde_json::Error> {
        doc.add_text(fields.id, self.id_text());
        doc.add_text(fields.name, &self.name);
        Ok(())
    }
}

/// Schema fields for the persons index.
#[derive(Debug)]
pub struct PersonFields {
    pub id: Field,
    pub full_name: Field,
    pub films: Field,
}

impl IndexDoc for Person {
    type Fields = PersonFields;

    const KIND: DocKind = DocKind::Persons;

    fn build_schema() -> (Schema, PersonFields) {
        let mut builder = SchemaBuilder::default();
        let id = builder.add_text_field("id", STRING | STORED);
        let full_name = builder.add_text_field("full_name", ru_en_text());
        let films = builder.add_text_field("films", STORED);
        (builder.build(), PersonFields { id, full_name, films })
    }

    fn id_field(fields: &PersonFields) -> Field {
        fields.id
    }

    fn search_fields(fields: &PersonFields) -> Vec<Field> {
        vec![fields.full_name]
    }

    fn id_text(&self) -> String {
        self.id.to_string()
    }

    fn write_into(
        &self,
        fields: &PersonFields,
        doc: &mut TantivyDocument,
    ) -> Result<(), serde_json::Error> {
        doc.add_text(fields.id, self.id_text());
        doc.add_text(fields.full_name, &self.full_name);
        doc.add_text(fields.films, serde_json::to_string(&self.films_grouped())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_kind_parses_known_names_only() {
        assert_eq!("movies".parse::<DocKind>().unwrap(), DocKind::Movies);
        assert_eq!("persons".parse::<DocKind>().unwrap(), DocKind::Persons);
        assert!("films".parse::<DocKind>().is_err());
    }

    #[test]
    fn movie_schema_has_keyword_id_and_text_fields() {
        let (schema, fields) = Movie::build_schema();
        assert!(schema.get_field("id").is_ok());
        assert!(schema.get_field("title").is_ok());
        assert!(schema.get_field("genres").is_ok());
        assert_eq!(Movie::id_field(&fields), fields.id);
        assert!(Movie::search_fields(&fields).contains(&fields.title));
    }
}
