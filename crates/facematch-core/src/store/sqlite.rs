use super::{warn_duplicate_id, FaceStore, StoreError};
use crate::types::{Embedding, FaceRecord};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS faces (
        seq       INTEGER PRIMARY KEY AUTOINCREMENT,
        name      TEXT NOT NULL,
        person_id TEXT NOT NULL,
        embedding BLOB NOT NULL
    );
";

/// Face store backed by a SQLite database.
///
/// Embeddings are stored as little-endian `f32` blobs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_all(&self) -> Result<Vec<FaceRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT seq, name, person_id, embedding FROM faces ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, name, id, blob) = row?;
            match blob_to_values(&blob) {
                Some(values) => records.push(FaceRecord {
                    name,
                    id,
                    embedding: Embedding::new(values),
                }),
                None => tracing::warn!(seq, bytes = blob.len(), "skipping face row with malformed embedding"),
            }
        }
        Ok(records)
    }
}

impl FaceStore for SqliteStore {
    fn load(&self) -> Vec<FaceRecord> {
        self.query_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read face store; treating as empty");
            Vec::new()
        })
    }

    fn append(&self, record: FaceRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        let duplicate: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM faces WHERE person_id = ?1)",
                params![record.id],
                |row| row.get(0),
            )
            .unwrap_or(false);
        if duplicate {
            warn_duplicate_id(&record.id);
        }

        conn.execute(
            "INSERT INTO faces (name, person_id, embedding) VALUES (?1, ?2, ?3)",
            params![record.name, record.id, values_to_blob(&record.embedding.values)],
        )?;
        tracing::info!(name = %record.name, id = %record.id, "appended face record");
        Ok(())
    }
}

fn values_to_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_values(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
