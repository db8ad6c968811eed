use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{model::ModelError, prediction::RankError, preprocess::PreprocessError};

/// Errors surfaced by the HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Malformed upload: {0}")]
    NotMultipart(#[from] MultipartRejection),

    #[error(transparent)]
    Image(#[from] PreprocessError),

    #[error("Inference failed: {0}")]
    Model(#[from] ModelError),

    #[error("Inference failed: {0}")]
    Rank(#[from] RankError),

    #[error("Inference task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::Multipart(_)
            | ApiError::NotMultipart(_)
            | ApiError::Image(_) => StatusCode::BAD_REQUEST,
            ApiError::Model(_) | ApiError::Rank(_) | ApiError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "prediction failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
