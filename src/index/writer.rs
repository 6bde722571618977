//! Index lifecycle and idempotent upserts.

use std::fmt;
use std::path::{Path, PathBuf};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema};
use tantivy::{Index, IndexReader, IndexSettings, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use super::analyzer;
use super::error::{IndexError, IndexResult};
use super::schema::IndexDoc;

/// Heap budget handed to each batch writer.
const WRITER_BUDGET_BYTES: usize = 50_000_000;

/// One on-disk tantivy index for a single document kind.
pub struct SearchIndex<D: IndexDoc> {
    index: Index,
    reader: IndexReader,
    schema: Schema,
    fields: D::Fields,
    path: PathBuf,
}

impl<D: IndexDoc> fmt::Debug for SearchIndex<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndex")
            .field("kind", &D::KIND.name())
            .field("path", &self.path)
            .finish()
    }
}

impl<D: IndexDoc> SearchIndex<D> {
    /// Opens (or creates) the index for this kind under `root`.
    pub fn open(root: &Path) -> IndexResult<Self> {
        let path = root.join(D::KIND.name());
        std::fs::create_dir_all(&path)?;

        let (schema, fields) = D::build_schema();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(&path).map_err(IndexError::from)?
        } else {
            let dir = MmapDirectory::open(&path).map_err(|source| IndexError::OpenDirectory {
                path: path.clone(),
                source,
            })?;
            Index::create(dir, schema.clone(), IndexSettings::default())?
        };
        analyzer::register(&index);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            schema,
            fields,
            path,
        })
    }

    pub fn fields(&self) -> &D::Fields {
        &self.fields
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upserts every document by its stable id and commits. Re-applying an
    /// identical batch leaves the index observably unchanged.
    pub fn upsert_batch(&self, docs: &[D]) -> IndexResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let mut writer = self.index.writer::<TantivyDocument>(WRITER_BUDGET_BYTES)?;
        for item in docs {
            let id = item.id_text();
            writer.delete_term(Term::from_field_text(D::id_field(&self.fields), &id));
            let mut doc = TantivyDocument::new();
            item.write_into(&self.fields, &mut doc)?;
            writer.add_document(doc)?;
        }
        writer.commit()?;
        self.reader.reload()?;
        debug!(kind = %D::KIND, count = docs.len(), "upserted documents");
        Ok(docs.len())
    }

    /// Looks a document up by its stable id.
    pub fn fetch(&self, id: &str) -> IndexResult<Option<TantivyDocument>> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(D::id_field(&self.fields), id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, addr)) => Ok(Some(searcher.doc::<TantivyDocument>(*addr)?)),
            None => Ok(None),
        }
    }

    /// Free-text search over this kind's default fields.
    pub fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<(f32, TantivyDocument)>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, D::search_fields(&self.fields));
        let parsed = parser.parse_query(query)?;
        let top = searcher.search(&parsed, &TopDocs::with_limit(limit))?;
        let mut results = Vec::with_capacity(top.len());
        for (score, addr) in top {
            results.push((score, searcher.doc::<TantivyDocument>(addr)?));
        }
        Ok(results)
    }

    pub fn doc_count(&self) -> IndexResult<u64> {
        Ok(self.reader.searcher().num_docs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Genre, GenreRef, Movie};
    use tantivy::schema::Value;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn genre(n: u128, name: &str) -> Genre {
        Genre {
            id: Uuid::from_u128(n),
            name: name.into(),
        }
    }

    #[test]
    fn upsert_and_fetch_by_id() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::<Genre>::open(dir.path()).unwrap();

        let g = genre(1, "scifi");
        index.upsert_batch(std::slice::from_ref(&g)).unwrap();

        let doc = index.fetch(&g.id.to_string()).unwrap().unwrap();
        let name = doc
            .get_first(index.fields().name)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(name, "scifi");
    }

    #[test]
    fn reapplying_identical_batch_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::<Genre>::open(dir.path()).unwrap();

        let g = genre(1, "drama");
        index.upsert_batch(std::slice::from_ref(&g)).unwrap();
        index.upsert_batch(std::slice::from_ref(&g)).unwrap();

        assert_eq!(index.doc_count().unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::<Genre>::open(dir.path()).unwrap();

        index.upsert_batch(&[genre(1, "horor")]).unwrap();
        index.upsert_batch(&[genre(1, "horror")]).unwrap();

        assert_eq!(index.doc_count().unwrap(), 1);
        let doc = index
            .fetch(&Uuid::from_u128(1).to_string())
            .unwrap()
            .unwrap();
        let name = doc
            .get_first(index.fields().name)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(name, "horror");
    }

    #[test]
    fn movie_documents_store_uppercase_title_and_child_json() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::<Movie>::open(dir.path()).unwrap();

        let movie = Movie {
            id: Uuid::from_u128(7),
            title: "dune".into(),
            description: "sand".into(),
            rating: Some(8.2),
            genres: vec![GenreRef {
                id: Uuid::from_u128(2),
                name: "scifi".into(),
            }],
            persons: Vec::new(),
        };
        index.upsert_batch(std::slice::from_ref(&movie)).unwrap();

        let doc = index.fetch(&movie.id.to_string()).unwrap().unwrap();
        let fields = index.fields();
        let title = doc
            .get_first(fields.title)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(title, "DUNE");

        let genres_json = doc
            .get_first(fields.genres)
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(genres_json.contains("scifi"));

        // Zero persons still yields empty arrays, never missing fields.
        let actors_json = doc
            .get_first(fields.actors)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(actors_json, "[]");
    }

    #[test]
    fn search_matches_stemmed_terms() {
        let dir = TempDir::new().unwrap();
        let index = SearchIndex::<Genre>::open(dir.path()).unwrap();
        index.upsert_batch(&[genre(1, "documentaries")]).unwrap();

        let hits = index.search("documentary", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
