use std::any::Any;

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::transcript::TranscriptError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No JSON data provided")]
    NoData,

    #[error("video_id is required")]
    MissingVideoId,

    #[error(transparent)]
    NotFound(#[from] TranscriptError),

    #[error("Access denied")]
    Forbidden,

    #[error("{}", .0.body_text())]
    Body(#[from] BytesRejection),

    #[error("Unexpected error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoData | ApiError::MissingVideoId => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref detail) = self {
            log::error!("Unexpected error: {}", detail);
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "panicked without a message".to_string()
    }
}
