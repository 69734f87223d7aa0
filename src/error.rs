use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Unknown step name or out-of-range parameter. Fails the whole run.
    #[error("Invalid pipeline configuration: {0}")]
    Configuration(String),

    /// The OCR backend or orientation detector raised or timed out.
    #[error("OCR backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Failed to decode image: {0}")]
    InvalidImage(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            PipelineError::InitializationError(_) => "INIT_ERROR",
            PipelineError::InvalidImage(_) => "INVALID_IMAGE",
            PipelineError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            PipelineError::MissingFile => "MISSING_FILE",
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PipelineError::Configuration(_)
            | PipelineError::InvalidImage(_)
            | PipelineError::MissingFile
            | PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::InitializationError(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
