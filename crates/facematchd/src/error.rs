use crate::api::ErrorResponse;
use crate::service::ServiceError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            return StatusCode::BAD_REQUEST;
        }
        match self {
            ServiceError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, "request rejected");
        }

        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

impl From<MultipartError> for ServiceError {
    fn from(e: MultipartError) -> Self {
        ServiceError::InvalidInput(format!("malformed upload: {}", e.body_text()))
    }
}
