mod cache;
mod database;
mod mutate;
pub mod registry;
pub mod schema;
pub mod stream;

#[cfg(test)]
mod fixtures;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use cache::{CacheManager, CacheScope};
pub use database::{ColumnInfo, FileInfo, FutureDates, SkypeDatabase, TableInfo};
pub use mutate::QueryFilter;
pub use registry::{open_with_retry, ConsumerId, DatabaseRegistry, SharedDatabase};
pub use stream::{extend_newer, extend_older, MessageQuery, MessageStream};

/// Why a database file could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    Missing,
    NotADatabase,
    Locked,
    Other(String),
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenFailure::Missing => f.write_str("file does not exist"),
            OpenFailure::NotADatabase => f.write_str("not a valid database"),
            OpenFailure::Locked => f.write_str("file in use"),
            OpenFailure::Other(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: OpenFailure },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no schema known for table {0}")]
    UnknownTable(String),
    #[error("table {table} has no single-column primary key")]
    UnsupportedPrimaryKey { table: String },
    #[error("row for table {table} has no primary key value")]
    MissingPrimaryKey { table: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("database {} still has consumers", .0.display())]
    InUse(PathBuf),
    #[error("database {} is not open", .0.display())]
    Closed(PathBuf),
}

impl StorageError {
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            StorageError::Open {
                reason: OpenFailure::Locked,
                ..
            }
        )
    }
}
