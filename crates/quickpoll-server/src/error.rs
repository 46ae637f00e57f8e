//! HTTP error responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quickpoll_core::PollError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A poll operation failed.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// The request body could not be read.
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    /// Status code and machine-readable kind for this error.
    #[must_use]
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Poll(err) => {
                let status = match err {
                    PollError::Validation(_) | PollError::InvalidChoice { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    PollError::NotFound(_) => StatusCode::NOT_FOUND,
                    PollError::Expired(_) => StatusCode::CONFLICT,
                    PollError::Subscription(_) => StatusCode::CONFLICT,
                    PollError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": kind,
            "detail": self.to_string()
        }));

        (status, body).into_response()
    }
}
