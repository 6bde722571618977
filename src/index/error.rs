use std::path::PathBuf;

use tantivy::TantivyError;
use tantivy::directory::error::OpenDirectoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] TantivyError),

    #[error("cannot open index directory {path}: {source}")]
    OpenDirectory {
        path: PathBuf,
        source: OpenDirectoryError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("query error: {0}")]
    Query(#[from] tantivy::query::QueryParserError),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    /// Errors worth reopening the index for, as opposed to schema or query
    /// bugs.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::OpenDirectory { .. } => true,
            Self::Tantivy(e) => matches!(
                e,
                TantivyError::IoError(..) | TantivyError::LockFailure(..)
            ),
            Self::Serialize(_) | Self::Query(_) => false,
        }
    }
}
