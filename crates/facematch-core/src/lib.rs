//! facematch-core: face extraction, matching, and enrollment storage.
//!
//! Extraction uses SCRFD for detection and ArcFace for embeddings, both
//! through ONNX Runtime. Matching is a linear nearest-neighbour scan under a
//! Euclidean distance tolerance.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod store;
pub mod types;

pub use extractor::{default_model_dir, ExtractError, FaceExtractor, OnnxExtractor};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_TOLERANCE};
pub use store::{open_store, FaceStore, FlatFileStore, SqliteStore, StoreBackend, StoreError};
pub use types::{
    BoundingBox, DetectedFace, Embedding, FaceBox, FaceMatch, FaceRecord, FaceSummary, MatchResult,
};

use std::path::PathBuf;

/// Per-user data directory: `$XDG_DATA_HOME/facematch`, falling back to
/// `~/.local/share/facematch`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
}
