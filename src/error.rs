// API errors
// Each variant maps to one HTTP status and a JSON `{"error": ...}` body

use crate::climate::DateParseError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A `<start>` or `<end>` path segment that is not a `YYYY-MM-DD` date
    #[error(transparent)]
    InvalidDate(#[from] DateParseError),

    /// The store failed to answer; the cause is logged, not returned
    #[error("store query failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::InvalidDate(e) => e.to_string(),
            ApiError::Store(e) => {
                error!(error = %format!("{:#}", e), "Store query failed");
                "internal server error".to_string()
            }
        };

        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
