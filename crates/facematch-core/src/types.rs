use serde::{Deserialize, Serialize};

/// Face detection in image space, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Convert to integer `(top, right, bottom, left)` pixel coordinates,
    /// clamped to an image of the given size.
    pub fn to_face_box(&self, image_width: u32, image_height: u32) -> FaceBox {
        let max_x = image_width.saturating_sub(1) as f32;
        let max_y = image_height.saturating_sub(1) as f32;
        let clamp = |v: f32, max: f32| v.round().clamp(0.0, max) as u32;

        FaceBox {
            top: clamp(self.y, max_y),
            right: clamp(self.x + self.width, max_x),
            bottom: clamp(self.y + self.height, max_y),
            left: clamp(self.x, max_x),
        }
    }
}

/// Face location in pixel space.
///
/// Serializes as `[top, right, bottom, left]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct FaceBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl From<[u32; 4]> for FaceBox {
    fn from([top, right, bottom, left]: [u32; 4]) -> Self {
        Self { top, right, bottom, left }
    }
}

impl From<FaceBox> for [u32; 4] {
    fn from(b: FaceBox) -> Self {
        [b.top, b.right, b.bottom, b.left]
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Returns `None` when the dimensions differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

/// An enrolled face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub name: String,
    pub id: String,
    pub embedding: Embedding,
}

impl FaceRecord {
    pub fn summary(&self) -> FaceSummary {
        FaceSummary {
            name: self.name.clone(),
            id: self.id.clone(),
            has_encoding: !self.embedding.is_empty(),
        }
    }
}

/// An enrolled face without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSummary {
    pub name: String,
    pub id: String,
    pub has_encoding: bool,
}

/// A face found in an image together with its embedding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    pub embedding: Embedding,
}

/// Name and id used for faces that matched nobody.
pub const UNKNOWN: &str = "Unknown";

/// An accepted match against an enrolled face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub name: String,
    pub id: String,
    /// `1 - distance`. Not a probability; negative when distance exceeds 1.
    pub confidence: f32,
}

impl FaceMatch {
    /// Placeholder entry for a face that matched nobody.
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            id: UNKNOWN.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN && self.id == UNKNOWN && self.confidence == 0.0
    }
}

/// Result of matching a probe embedding against the enrolled faces.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(FaceMatch),
    NoMatch,
}

impl MatchResult {
    /// Confidence of the match, 0.0 when nothing matched.
    pub fn confidence(&self) -> f32 {
        match self {
            MatchResult::Matched(m) => m.confidence,
            MatchResult::NoMatch => 0.0,
        }
    }

    pub fn into_match(self) -> Option<FaceMatch> {
        match self {
            MatchResult::Matched(m) => Some(m),
            MatchResult::NoMatch => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.5, -0.25, 1.0]);
        assert_eq!(a.euclidean_distance(&a), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        let d = a.euclidean_distance(&b).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_face_box_clamped_to_image() {
        let bbox = BoundingBox {
            x: -4.6,
            y: 10.2,
            width: 120.0,
            height: 50.0,
            confidence: 0.9,
            landmarks: None,
        };
        let b = bbox.to_face_box(100, 80);
        assert_eq!(b, FaceBox { top: 10, right: 99, bottom: 60, left: 0 });
    }

    #[test]
    fn test_face_box_array_order_is_trbl() {
        let b = FaceBox { top: 1, right: 2, bottom: 3, left: 4 };
        assert_eq!(<[u32; 4]>::from(b), [1, 2, 3, 4]);
        assert_eq!(FaceBox::from([1, 2, 3, 4]), b);
    }

    #[test]
    fn test_unknown_sentinel() {
        let m = FaceMatch::unknown();
        assert_eq!(m.name, "Unknown");
        assert_eq!(m.id, "Unknown");
        assert_eq!(m.confidence, 0.0);
        assert!(m.is_unknown());
    }

    #[test]
    fn test_no_match_confidence_is_zero() {
        assert_eq!(MatchResult::NoMatch.confidence(), 0.0);
    }
}
