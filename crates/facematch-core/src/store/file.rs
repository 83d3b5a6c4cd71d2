use super::{warn_duplicate_id, FaceStore, StoreError};
use crate::types::FaceRecord;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Leading bytes of a store file, followed by the postcard-encoded records.
const STORE_MAGIC: &[u8; 4] = b"FMS1";

/// What was found at the store path.
enum Snapshot {
    Records(Vec<FaceRecord>),
    /// Present but not decodable.
    Corrupt(String),
    /// Present but could not be read.
    Unreadable(std::io::Error),
}

/// Face store kept in a single file that is rewritten on every append.
///
/// The mutex only serializes appends made through this handle. Two handles
/// on the same file (or two processes) can interleave their read-modify-write
/// cycles, and the later writer silently drops the other's record.
pub struct FlatFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FlatFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Snapshot {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Snapshot::Records(Vec::new());
            }
            Err(e) => return Snapshot::Unreadable(e),
        };

        if bytes.is_empty() {
            return Snapshot::Records(Vec::new());
        }

        match decode(&bytes) {
            Ok(records) => Snapshot::Records(records),
            Err(reason) => Snapshot::Corrupt(reason),
        }
    }

    /// Replace the whole collection.
    ///
    /// Each call writes its own uniquely named temporary file in the store's
    /// directory and renames it over the store, so readers only ever see a
    /// complete collection.
    pub fn save_all(&self, records: &[FaceRecord]) -> Result<(), StoreError> {
        let mut bytes = STORE_MAGIC.to_vec();
        bytes.extend(postcard::to_allocvec(records)?);

        let write_err = |source| StoreError::Write { path: self.path.clone(), source };

        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "face store written");
        Ok(())
    }

    /// Move an undecodable store out of the way so it is not overwritten.
    ///
    /// Earlier backups are kept: the first goes to `<path>.corrupt`, later ones
    /// to `<path>.corrupt.1`, `<path>.corrupt.2`, and so on.
    fn quarantine(&self) -> Result<(), StoreError> {
        let backup = self.backup_path();
        std::fs::rename(&self.path, &backup).map_err(|source| StoreError::Write {
            path: backup.clone(),
            source,
        })?;
        tracing::warn!(backup = %backup.display(), "moved corrupt face store aside");
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let first = sibling(&self.path, ".corrupt");
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| sibling(&self.path, &format!(".corrupt.{n}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }
}

impl FaceStore for FlatFileStore {
    fn load(&self) -> Vec<FaceRecord> {
        match self.snapshot() {
            Snapshot::Records(records) => records,
            Snapshot::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "face store is corrupt; treating as empty"
                );
                Vec::new()
            }
            Snapshot::Unreadable(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "face store unreadable; treating as empty"
                );
                Vec::new()
            }
        }
    }

    fn append(&self, record: FaceRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut records = match self.snapshot() {
            Snapshot::Records(records) => records,
            Snapshot::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "face store is corrupt; starting a new one"
                );
                self.quarantine()?;
                Vec::new()
            }
            // Rewriting a file we could not read would throw its contents away.
            Snapshot::Unreadable(source) => {
                return Err(StoreError::Write { path: self.path.clone(), source });
            }
        };

        if records.iter().any(|r| r.id == record.id) {
            warn_duplicate_id(&record.id);
        }
        tracing::info!(name = %record.name, id = %record.id, "appending face record");
        records.push(record);
        self.save_all(&records)
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<FaceRecord>, String> {
    let body = bytes
        .strip_prefix(STORE_MAGIC.as_slice())
        .ok_or_else(|| "missing store header".to_string())?;
    postcard::from_bytes(body).map_err(|e| e.to_string())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
