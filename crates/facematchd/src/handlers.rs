//! HTTP endpoint handlers.

use crate::api::{
    display_confidence, EnrollResponse, ErrorResponse, KnownFacesResponse, MatchRequest, MessageResponse,
    RealtimeFace, RealtimeRequest, RealtimeResponse, RecognizeResponse, StatusResponse,
};
use crate::service::{FaceService, ServiceError};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine as _;
use facematch_core::{Embedding, MatchResult};
use image::RgbImage;
use std::path::Path;

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// GET / - Liveness message
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Face recognition service is running".to_string(),
    })
}

/// GET /status - Service status and enrollment count
pub async fn status(State(service): State<FaceService>) -> Result<Json<StatusResponse>, ServiceError> {
    let enrolled = service.list_enrolled().await?.len();
    Ok(Json(StatusResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: service.backend().as_str().to_string(),
        tolerance: service.tolerance(),
        enrolled,
    }))
}

/// POST /upload - Enroll the face in an uploaded image
pub async fn upload(
    State(service): State<FaceService>,
    mut multipart: Multipart,
) -> Result<Json<EnrollResponse>, ServiceError> {
    let form = UploadForm::read(&mut multipart).await?;

    let name = required_text(form.name, "name")?;
    let id = required_text(form.user_id, "user_id")?;
    let upload = form.image.ok_or_else(|| ServiceError::InvalidInput("no image file uploaded".into()))?;
    check_extension(&upload.file_name)?;

    let image = decode_image(upload.bytes).await?;
    tracing::info!(%name, %id, file = %upload.file_name, "enrolling face");
    let embedding = service.enroll(name.clone(), id.clone(), image).await?;
    tracing::info!(%name, %id, dim = embedding.len(), "face enrolled");

    Ok(Json(EnrollResponse {
        message: "Face uploaded and enrolled".to_string(),
        name,
        id,
        encoding: embedding.values,
    }))
}

/// POST /recognize - Identify the single face in an uploaded image
pub async fn recognize(
    State(service): State<FaceService>,
    mut multipart: Multipart,
) -> Result<Response, ServiceError> {
    let form = UploadForm::read(&mut multipart).await?;
    let upload = form.image.ok_or_else(|| ServiceError::InvalidInput("no image file uploaded".into()))?;
    check_extension(&upload.file_name)?;

    let image = decode_image(upload.bytes).await?;
    let result = service.identify_image(image).await?;
    Ok(match_response(result))
}

/// POST /match - Identify a precomputed embedding
pub async fn match_embedding(
    State(service): State<FaceService>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;

    if request.embedding.is_empty() {
        return Err(ServiceError::InvalidInput("embedding must not be empty".into()));
    }
    if request.embedding.iter().any(|v| !v.is_finite()) {
        return Err(ServiceError::InvalidInput("embedding values must be finite".into()));
    }
    if let Some(t) = request.tolerance {
        if !t.is_finite() || t < 0.0 {
            return Err(ServiceError::InvalidInput("tolerance must be a non-negative number".into()));
        }
    }

    let result = service
        .identify(Embedding::new(request.embedding), request.tolerance)
        .await?;
    Ok(match_response(result))
}

/// GET /known-faces - Every enrolled name and id
pub async fn known_faces(State(service): State<FaceService>) -> Result<Json<KnownFacesResponse>, ServiceError> {
    let faces = service.list_enrolled().await?;
    Ok(Json(KnownFacesResponse { total: faces.len(), faces }))
}

/// POST /recognize_realtime - Identify every face in a base64 frame
pub async fn recognize_realtime(
    State(service): State<FaceService>,
    payload: Result<Json<RealtimeRequest>, JsonRejection>,
) -> Result<Json<RealtimeResponse>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;
    let encoded = request
        .image
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("missing base64 image data".into()))?;

    let bytes = decode_base64_image(&encoded)?;
    let image = decode_image(Bytes::from(bytes)).await?;
    let faces = service.identify_all(image).await?;

    tracing::debug!(faces = faces.len(), "realtime frame processed");
    Ok(Json(RealtimeResponse {
        faces: faces
            .into_iter()
            .map(|f| RealtimeFace {
                face_box: f.face_box,
                name: f.identity.name,
                id: f.identity.id,
                confidence: f.identity.confidence,
            })
            .collect(),
    }))
}

fn match_response(result: MatchResult) -> Response {
    match result {
        MatchResult::Matched(m) => {
            tracing::info!(name = %m.name, id = %m.id, confidence = m.confidence, "face recognized");
            Json(RecognizeResponse {
                message: "Face recognized".to_string(),
                confidence: display_confidence(m.confidence),
                name: m.name,
                id: m.id,
            })
            .into_response()
        }
        MatchResult::NoMatch => {
            tracing::info!("no matching face");
            (
                StatusCode::NOT_FOUND,
                Json(MessageResponse { message: "No matching face found".to_string() }),
            )
                .into_response()
        }
    }
}

#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    user_id: Option<String>,
    image: Option<ImageUpload>,
}

struct ImageUpload {
    file_name: String,
    bytes: Bytes,
}

impl UploadForm {
    /// Collect the known fields; unknown fields are ignored.
    async fn read(multipart: &mut Multipart) -> Result<Self, ServiceError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_owned);
            match field_name.as_deref() {
                Some("name") => form.name = Some(field.text().await?),
                Some("user_id") => form.user_id = Some(field.text().await?),
                Some("image") => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let bytes = field.bytes().await?;
                    form.image = Some(ImageUpload { file_name, bytes });
                }
                other => tracing::debug!(field = ?other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::InvalidInput(format!("{field} is required"))),
    }
}

fn check_extension(file_name: &str) -> Result<(), ServiceError> {
    if file_name.is_empty() {
        return Err(ServiceError::InvalidInput("no image file selected".into()));
    }
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ServiceError::InvalidInput(
            "only .jpg, .jpeg and .png files are supported".into(),
        )),
    }
}

/// Accepts raw base64 or a `data:<mime>;base64,<data>` URL.
fn decode_base64_image(encoded: &str) -> Result<Vec<u8>, ServiceError> {
    let data = match encoded.split_once(',') {
        Some((_, data)) => data,
        None => encoded,
    };
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ServiceError::InvalidInput(format!("invalid base64 image data: {e}")))
}

async fn decode_image(bytes: Bytes) -> Result<RgbImage, ServiceError> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|img| img.to_rgb8())
            .map_err(|e| ServiceError::InvalidInput(format!("could not decode image: {e}")))
    })
    .await?
}

/// Body used for unknown routes.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { detail: "Not Found".to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_extension() {
        assert!(check_extension("face.JPG").is_ok());
        assert!(check_extension("face.jpeg").is_ok());
        assert!(check_extension("dir.v2/face.png").is_ok());
        assert!(check_extension("face.gif").is_err());
        assert!(check_extension("png").is_err());
        assert!(check_extension("").is_err());
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(Some(" Ada ".into()), "name").unwrap(), "Ada");
        assert!(required_text(Some("   ".into()), "name").is_err());
        let err = required_text(None, "user_id").unwrap_err();
        assert_eq!(err.to_string(), "user_id is required");
    }

    #[test]
    fn test_decode_base64_image_data_url() {
        assert_eq!(decode_base64_image("data:image/jpeg;base64,aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64_image("aGVs\nbG8=").unwrap(), b"hello");
        assert!(decode_base64_image("data:image/jpeg;base64,@@@").is_err());
    }
}
