use crate::engine::{EngineError, EngineHandle};
use facematch_core::{
    EuclideanMatcher, ExtractError, FaceBox, FaceMatch, FaceRecord, FaceStore, FaceSummary,
    Embedding, MatchResult, Matcher, StoreBackend, StoreError,
};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("face engine is not running")]
    EngineUnavailable,
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServiceError {
    /// True when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::InvalidInput(_) => true,
            ServiceError::Extract(e) => e.is_client_error(),
            _ => false,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Extract(e) => ServiceError::Extract(e),
            EngineError::ChannelClosed => ServiceError::EngineUnavailable,
        }
    }
}

/// A face located in an image and the identity assigned to it.
#[derive(Debug, Clone)]
pub struct IdentifiedFace {
    pub face_box: FaceBox,
    pub identity: FaceMatch,
}

/// Enrollment and recognition on top of the engine, store, and matcher.
#[derive(Clone)]
pub struct FaceService {
    engine: EngineHandle,
    store: Arc<dyn FaceStore>,
    backend: StoreBackend,
    tolerance: f32,
}

impl FaceService {
    pub fn new(engine: EngineHandle, store: Arc<dyn FaceStore>, backend: StoreBackend, tolerance: f32) -> Self {
        Self { engine, store, backend, tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    /// Extract the single face in `image` and store it under `name`/`id`.
    ///
    /// Nothing is stored when extraction fails, and the enrollment is not
    /// successful unless the store write succeeds.
    pub async fn enroll(&self, name: String, id: String, image: RgbImage) -> Result<Embedding, ServiceError> {
        let embedding = self.engine.encode_single(image).await?;

        let record = FaceRecord { name, id, embedding: embedding.clone() };
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.append(record)).await??;

        Ok(embedding)
    }

    /// Match an embedding against every enrolled face.
    pub async fn identify(&self, embedding: Embedding, tolerance: Option<f32>) -> Result<MatchResult, ServiceError> {
        let tolerance = tolerance.unwrap_or(self.tolerance);
        let records = self.load().await?;
        Ok(EuclideanMatcher.compare(&embedding, &records, tolerance))
    }

    /// Extract the single face in `image` and match it.
    pub async fn identify_image(&self, image: RgbImage) -> Result<MatchResult, ServiceError> {
        let embedding = self.engine.encode_single(image).await?;
        self.identify(embedding, None).await
    }

    /// Match every face in `image`. Faces without a match are reported as
    /// unknown, so the result has one entry per detected face.
    pub async fn identify_all(&self, image: RgbImage) -> Result<Vec<IdentifiedFace>, ServiceError> {
        let faces = self.engine.detect_and_encode(image).await?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.load().await?;
        let probes: Vec<Embedding> = faces.iter().map(|f| f.embedding.clone()).collect();
        let matches = EuclideanMatcher.compare_each(&probes, &records, self.tolerance);

        Ok(faces
            .into_iter()
            .zip(matches)
            .map(|(face, identity)| IdentifiedFace { face_box: face.face_box, identity })
            .collect())
    }

    /// Names and ids of every enrolled face.
    pub async fn list_enrolled(&self) -> Result<Vec<FaceSummary>, ServiceError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.list_summaries()).await?)
    }

    async fn load(&self) -> Result<Vec<FaceRecord>, ServiceError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.load()).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::{spawn_engine, testing::PixelFaces};
    use facematch_core::FlatFileStore;
    use std::path::Path;

    /// Service with the pixel extractor and a file store under `dir`.
    pub fn pixel_service(dir: &Path) -> FaceService {
        let engine = spawn_engine(Box::new(PixelFaces)).expect("spawn engine");
        let store: Arc<dyn FaceStore> = Arc::new(FlatFileStore::new(dir.join("known_faces.bin")));
        FaceService::new(engine, store, StoreBackend::File, facematch_core::DEFAULT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::pixel_service;
    use super::*;
    use crate::engine::testing::faces_image;

    #[tokio::test]
    async fn test_enroll_then_identify_same_image() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());

        let embedding = service
            .enroll("Ada".into(), "001".into(), faces_image(&[[200, 10, 30]]))
            .await
            .unwrap();

        let result = service.identify(embedding, None).await.unwrap();
        let m = result.into_match().expect("expected a match");
        assert_eq!((m.name.as_str(), m.id.as_str()), ("Ada", "001"));
        assert_eq!(m.confidence, 1.0);

        let by_image = service.identify_image(faces_image(&[[200, 10, 30]])).await.unwrap();
        assert_eq!(by_image.confidence(), 1.0);
    }

    #[tokio::test]
    async fn test_enroll_rejects_wrong_face_count() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());

        let err = service
            .enroll("a".into(), "1".into(), faces_image(&[[0, 0, 0]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Extract(ExtractError::NoFaceFound)));
        assert!(err.is_client_error());

        let err = service
            .enroll("a".into(), "1".into(), faces_image(&[[1, 1, 1], [2, 2, 2]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Extract(ExtractError::MultipleFacesFound(2))));

        assert!(service.list_enrolled().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identify_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());
        let result = service.identify(Embedding::new(vec![0.1, 0.2, 0.3]), None).await.unwrap();
        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(result.confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_identify_tolerance_override() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());
        service
            .enroll("Ada".into(), "001".into(), faces_image(&[[255, 0, 0]]))
            .await
            .unwrap();

        // Distance 0.3 from the enrolled [1, 0, 0].
        let probe = Embedding::new(vec![0.7, 0.0, 0.0]);
        let m = service.identify(probe.clone(), None).await.unwrap().into_match().unwrap();
        assert!((m.confidence - 0.7).abs() < 1e-6);
        assert_eq!(service.identify(probe, Some(0.2)).await.unwrap(), MatchResult::NoMatch);
    }

    #[tokio::test]
    async fn test_identify_all_reports_every_face() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());
        service
            .enroll("Red".into(), "r".into(), faces_image(&[[255, 0, 0]]))
            .await
            .unwrap();

        let faces = service
            .identify_all(faces_image(&[[255, 0, 0], [0, 0, 255], [0, 255, 0]]))
            .await
            .unwrap();

        assert_eq!(faces.len(), 3);
        assert_eq!(faces[0].identity.id, "r");
        assert_eq!(faces[0].face_box.left, 0);
        assert!(faces[1].identity.is_unknown());
        assert!(faces[2].identity.is_unknown());
        assert_eq!(faces[2].face_box.left, 2);
    }

    #[tokio::test]
    async fn test_identify_all_without_faces() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());
        assert!(service.identify_all(faces_image(&[])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_enrolled_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let service = pixel_service(dir.path());
        for (name, id, colour) in [("a", "1", [10, 0, 0]), ("b", "2", [0, 10, 0]), ("a", "1", [0, 0, 10])] {
            service.enroll(name.into(), id.into(), faces_image(&[colour])).await.unwrap();
        }
        let listed = service.list_enrolled().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "1"]);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let service = pixel_service(&blocker);

        let err = service
            .enroll("a".into(), "1".into(), faces_image(&[[5, 5, 5]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert!(!err.is_client_error());
    }
}
