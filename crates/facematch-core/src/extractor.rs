//! Face extraction contract and its ONNX implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DetectedFace, Embedding};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face found in the image")]
    NoFaceFound,
    #[error("found {0} faces in the image; upload an image with exactly one clear face")]
    MultipleFacesFound(usize),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

impl ExtractError {
    /// True when the caller can fix the problem by sending a different image.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExtractError::NoFaceFound | ExtractError::MultipleFacesFound(_))
    }
}

/// Finds faces in an image and turns them into embeddings.
pub trait FaceExtractor: Send {
    /// Detect faces, sorted by descending confidence.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError>;

    /// Embedding of one detected face.
    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, ExtractError>;

    /// Every face in the image with its box and embedding. May be empty.
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let faces = self.detect(image)?;
        faces
            .iter()
            .map(|face| {
                Ok(DetectedFace {
                    face_box: face.to_face_box(image.width(), image.height()),
                    embedding: self.encode(image, face)?,
                })
            })
            .collect()
    }

    /// Embedding of the only face in the image.
    ///
    /// Fails with [`ExtractError::NoFaceFound`] or
    /// [`ExtractError::MultipleFacesFound`] unless exactly one face is
    /// detected. Nothing is encoded in the failure cases.
    fn encode_single(&mut self, image: &RgbImage) -> Result<Embedding, ExtractError> {
        let faces = self.detect(image)?;
        match faces.as_slice() {
            [] => Err(ExtractError::NoFaceFound),
            [face] => self.encode(image, face),
            many => Err(ExtractError::MultipleFacesFound(many.len())),
        }
    }
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            faces = faces.len(),
            "detection finished"
        );
        Ok(faces)
    }

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, ExtractError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}

/// Default model directory: `$XDG_DATA_HOME/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    crate::default_data_dir().join("models")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Treats every non-black pixel in the top row as a face whose embedding
    /// is the pixel's colour.
    struct PixelFaces {
        encoded: usize,
    }

    impl FaceExtractor for PixelFaces {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
            Ok((0..image.width())
                .filter(|&x| image.get_pixel(x, 0).0 != [0, 0, 0])
                .map(|x| BoundingBox {
                    x: x as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 0.9,
                    landmarks: None,
                })
                .collect())
        }

        fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, ExtractError> {
            self.encoded += 1;
            let p = image.get_pixel(face.x as u32, 0);
            Ok(Embedding::new(p.0.iter().map(|&c| c as f32 / 255.0).collect()))
        }
    }

    fn row(pixels: &[[u8; 3]]) -> RgbImage {
        let mut image = RgbImage::new(pixels.len().max(1) as u32, 2);
        for (x, p) in pixels.iter().enumerate() {
            image.put_pixel(x as u32, 0, Rgb(*p));
        }
        image
    }

    #[test]
    fn test_encode_single_no_face() {
        let mut ex = PixelFaces { encoded: 0 };
        let err = ex.encode_single(&row(&[[0, 0, 0]])).unwrap_err();
        assert!(matches!(err, ExtractError::NoFaceFound));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_encode_single_many_faces_skips_encoding() {
        let mut ex = PixelFaces { encoded: 0 };
        let err = ex.encode_single(&row(&[[255, 0, 0], [0, 0, 0], [0, 255, 0]])).unwrap_err();
        assert!(matches!(err, ExtractError::MultipleFacesFound(2)));
        assert_eq!(ex.encoded, 0);
    }

    #[test]
    fn test_encode_single_one_face() {
        let mut ex = PixelFaces { encoded: 0 };
        let emb = ex.encode_single(&row(&[[0, 0, 0], [255, 0, 255]])).unwrap();
        assert_eq!(emb.values, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_detect_and_encode_boxes() {
        let mut ex = PixelFaces { encoded: 0 };
        let faces = ex.detect_and_encode(&row(&[[255, 0, 0], [0, 0, 0], [0, 0, 255]])).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1].face_box.left, 2);
        assert_eq!(faces[1].embedding.values, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_onnx_extractor_missing_models() {
        let err = OnnxExtractor::load(Path::new("/nonexistent")).err().unwrap();
        assert!(matches!(err, ExtractError::Detector(DetectorError::ModelNotFound(_))));
        assert!(!err.is_client_error());
    }
}
