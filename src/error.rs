use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::tts::SynthesisError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Text is required")]
    TextRequired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Reference audio not found: {0}")]
    ReferenceNotFound(String),
}

impl From<SynthesisError> for AppError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::TextRequired => AppError::TextRequired,
            SynthesisError::BackendUnavailable(msg) => AppError::BackendUnavailable(msg),
            other => AppError::SynthesisFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::TextRequired => (
                StatusCode::BAD_REQUEST,
                "TEXT_REQUIRED",
                "Text is required".to_string(),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::InvalidBody(rejection) => {
                (rejection.status(), "INVALID_BODY", rejection.body_text())
            }
            AppError::BackendUnavailable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "BACKEND_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::SynthesisFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYNTHESIS_FAILED",
                format!("Synthesis failed: {}", msg),
            ),
            AppError::ReferenceNotFound(path) => (
                StatusCode::NOT_FOUND,
                "REFERENCE_NOT_FOUND",
                format!("Reference audio not found: {}", path),
            ),
        };

        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
