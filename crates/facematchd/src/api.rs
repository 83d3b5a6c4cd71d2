//! JSON bodies of the HTTP API.

use facematch_core::{FaceBox, FaceSummary};
use serde::{Deserialize, Serialize};

/// Response for `GET /`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub tolerance: f32,
    pub enrolled: usize,
}

/// Response for `POST /upload`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub message: String,
    pub name: String,
    pub id: String,
    pub encoding: Vec<f32>,
}

/// Request for `POST /match`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchRequest {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub tolerance: Option<f32>,
}

/// Successful response for `POST /recognize` and `POST /match`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub message: String,
    pub name: String,
    pub id: String,
    pub confidence: f64,
}

/// Response for `GET /known-faces`.
#[derive(Debug, Serialize, Deserialize)]
pub struct KnownFacesResponse {
    pub faces: Vec<FaceSummary>,
    pub total: usize,
}

/// Request for `POST /recognize_realtime`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RealtimeRequest {
    /// Base64 image, optionally as a `data:image/...;base64,` URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// One face in a `POST /recognize_realtime` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RealtimeFace {
    #[serde(rename = "box")]
    pub face_box: FaceBox,
    pub name: String,
    pub id: String,
    pub confidence: f32,
}

/// Response for `POST /recognize_realtime`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RealtimeResponse {
    pub faces: Vec<RealtimeFace>,
}

/// Error body for every non-2xx response except "no match".
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Round a confidence to three decimals for display.
pub fn display_confidence(confidence: f32) -> f64 {
    (confidence as f64 * 1000.0).round() / 1000.0
}
