use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::classifier::ClassifyError;
use crate::models::ErrorBody;

/// Everything that can end an upload request early.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No image uploaded.")]
    NoImage,
    #[error("Malformed upload.")]
    Malformed(String),
    #[error("Could not save upload.")]
    Staging(#[source] std::io::Error),
    #[error("Inference failed.")]
    Inference(#[source] ClassifyError),
    #[error("Invalid response from Python script.")]
    InvalidOutput,
}

impl From<ClassifyError> for UploadError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::InvalidOutput { stdout, source } => {
                tracing::error!(%stdout, error = %source, "invalid JSON response from classifier");
                UploadError::InvalidOutput
            }
            other => {
                tracing::error!(stderr = %other.details(), error = %other, "inference error");
                UploadError::Inference(other)
            }
        }
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::NoImage | UploadError::Malformed(_) => StatusCode::BAD_REQUEST,
            UploadError::Staging(_) | UploadError::Inference(_) | UploadError::InvalidOutput => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            UploadError::Malformed(reason) => Some(reason.clone()),
            UploadError::Inference(err) => Some(err.details()),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            details,
        })
    }
}
