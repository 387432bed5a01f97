//! af-trace: Debug history and run result storage backed by SQLite.

pub mod export;
pub mod query;
pub mod store;

pub use query::TraceQuery;
pub use store::TraceStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("export error: {0}")]
    Export(String),
}

impl From<rusqlite::Error> for TraceError {
    fn from(e: rusqlite::Error) -> Self {
        TraceError::Database(e.to_string())
    }
}
