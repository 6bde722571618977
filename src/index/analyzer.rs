//! Text analysis for catalog fields.
//!
//! Catalog text arrives in both English and Russian, so every full-text
//! field runs through one analyzer that lowercases, strips stop words, and
//! stems in both languages. Queries in either language then match without
//! the caller knowing which language a document is in.

use tantivy::Index;
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer,
};

/// Tokenizer name referenced by every full-text field in the schemas.
pub const RU_EN: &str = "ru_en";

fn stop_words(language: Language) -> StopWordFilter {
    // The bundled list can be absent for a language; an empty filter keeps
    // the analyzer chain intact.
    StopWordFilter::new(language).unwrap_or_else(|| StopWordFilter::remove(Vec::<String>::new()))
}

pub fn ru_en() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(stop_words(Language::English))
        .filter(stop_words(Language::Russian))
        .filter(Stemmer::new(Language::English))
        .filter(Stemmer::new(Language::Russian))
        .build()
}

/// Registers the analyzer on an index. Tokenizers are not persisted, so
/// this must run every time an index is created or reopened.
pub fn register(index: &Index) {
    index.tokenizers().register(RU_EN, ru_en());
}
