//! Persistence of enrolled faces.
//!
//! Every operation works on the whole collection: reads load everything,
//! writes rewrite everything. Read failures degrade to an empty collection;
//! write failures are returned to the caller.

mod file;
mod sqlite;

pub use file::FlatFileStore;
pub use sqlite::SqliteStore;

use crate::types::{FaceRecord, FaceSummary};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write face store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode face store: {0}")]
    Encode(#[from] postcard::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// An insertion-ordered collection of enrolled faces.
pub trait FaceStore: Send + Sync {
    /// All records in insertion order. Missing or unreadable data yields an
    /// empty list.
    fn load(&self) -> Vec<FaceRecord>;

    /// Append a record. Duplicate ids are accepted.
    fn append(&self, record: FaceRecord) -> Result<(), StoreError>;

    /// All records without their embeddings.
    fn list_summaries(&self) -> Vec<FaceSummary> {
        self.load().iter().map(FaceRecord::summary).collect()
    }
}

/// Which [`FaceStore`] implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::File => "file",
            StoreBackend::Sqlite => "sqlite",
        }
    }

    /// Default file name inside the data directory.
    pub fn default_file_name(self) -> &'static str {
        match self {
            StoreBackend::File => "known_faces.bin",
            StoreBackend::Sqlite => "faces.db",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "flat" => Ok(StoreBackend::File),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{other}' (expected 'file' or 'sqlite')")),
        }
    }
}

/// Open the configured backend at `path`.
pub fn open_store(backend: StoreBackend, path: &Path) -> Result<Arc<dyn FaceStore>, StoreError> {
    let store: Arc<dyn FaceStore> = match backend {
        StoreBackend::File => Arc::new(FlatFileStore::new(path)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(path)?),
    };
    tracing::info!(backend = backend.as_str(), path = %path.display(), "face store opened");
    Ok(store)
}

/// Duplicate ids are stored anyway; this only reports them.
fn warn_duplicate_id(id: &str) {
    tracing::warn!(id, "id already enrolled; adding duplicate entry");
}
