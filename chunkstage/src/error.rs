use std::io;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    code: u16,
    error: &'static str,
    message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    // Request errors
    #[error("bad request: {0}")]
    BadRequest(String), // Malformed JSON or multipart body

    #[error("validation failed: {0}")]
    Validation(String), // Missing or unusable field

    #[error("upload of {hash} is incomplete, missing chunks {missing:?}")]
    IncompleteUpload { hash: String, missing: Vec<u64> },

    #[error("chunk size mismatch: {0}")]
    ChunkSizeMismatch(String),

    #[error("no staged chunks for {0}")]
    UploadUnknown(String), // Contains the file hash

    #[error("a merge of {0} is already in progress")]
    MergeInProgress(String), // Contains the file hash

    // Server-side state errors
    #[error("staging area is corrupt: {0}")]
    CorruptState(String),

    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::IncompleteUpload { .. }
            | Self::ChunkSizeMismatch(_) => StatusCode::BAD_REQUEST,
            Self::UploadUnknown(_) => StatusCode::NOT_FOUND,
            Self::MergeInProgress(_) => StatusCode::CONFLICT,
            Self::CorruptState(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
            Self::ChunkSizeMismatch(_) => "CHUNK_SIZE_MISMATCH",
            Self::UploadUnknown(_) => "UPLOAD_UNKNOWN",
            Self::MergeInProgress(_) => "MERGE_IN_PROGRESS",
            Self::CorruptState(_) => "CORRUPT_STATE",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!(kind = self.kind(), "Generating response for AppError: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "Generating response for AppError: {}", self);
        }

        let body = ErrorBody {
            code: status_code.as_u16(),
            error: self.kind(),
            message: self.to_string(),
        };
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MergeInProgress("h".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::UploadUnknown("h".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(io::Error::other("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_carries_nonzero_code() {
        let response = AppError::CorruptState("bad entry".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 500);
        assert_eq!(body["error"], "CORRUPT_STATE");
    }
}
