use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::storage::upload_store::UploadError;
use crate::taxonomy::TaxonomyError;

pub const MODEL_COMPATIBILITY_MESSAGE: &str =
    "Model compatibility issue. Please retrain the model with current scikit-learn version.";

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("failed to load model from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("model is unavailable: {0}")]
    Unavailable(String),
    #[error("invalid model input: {0}")]
    InvalidInput(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("{0}")]
    Taxonomy(#[from] TaxonomyError),
    #[error("model error: {0}")]
    Backend(String),
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Backend(err.to_string())
    }
}

/// Errors rendered to HTTP clients as JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
    #[error("{}", MODEL_COMPATIBILITY_MESSAGE)]
    Model(#[source] InferenceError),
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        ApiError::Model(err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidFile => ApiError::BadRequest(err.to_string()),
            UploadError::FileTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            UploadError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) | ApiError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Model(inner) => ErrorResponse {
                error: MODEL_COMPATIBILITY_MESSAGE.to_string(),
                details: Some(inner.to_string()),
            },
            other => ErrorResponse {
                error: other.to_string(),
                details: None,
            },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
