use std::path::PathBuf;

use rusqlite::ffi::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source query failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("cannot open source database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("unparseable updated_at value `{value}` in table {table}")]
    Timestamp { table: &'static str, value: String },
}

pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    /// Operational errors worth a reconnect attempt, as opposed to
    /// malformed queries or contract violations.
    pub fn is_transient(&self) -> bool {
        let sql_error = match self {
            Self::Sql(e) => e,
            Self::Open { source, .. } => source,
            Self::Timestamp { .. } => return false,
        };
        match sql_error {
            rusqlite::Error::SqliteFailure(e, _) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::OperationInterrupted
            ),
            _ => false,
        }
    }
}
