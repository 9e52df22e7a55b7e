/// Error taxonomy → HTTP mapping.
///
/// The only place status codes are chosen for failures. Every error body
/// has the shape `{"errors": {"imports": <message>}}`.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ImportError;

/// Body of every 401 caused by a dead provider token.
pub const INVALID_TOKEN_MESSAGE: &str = "OAuth token invalid or expired";

#[derive(Debug, Serialize)]
struct ErrorMessages {
    imports: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    errors: ErrorMessages,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }
        let body = ErrorResponse {
            errors: ErrorMessages {
                imports: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Failures of OAuth operations: dead token → 401, anything else → 400.
pub fn oauth_failure(err: ImportError) -> ApiError {
    if err.is_token_expired() {
        ApiError::new(StatusCode::UNAUTHORIZED, INVALID_TOKEN_MESSAGE)
    } else {
        ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

/// Failures of job operations.
pub fn job_failure(err: ImportError) -> ApiError {
    let status = match &err {
        ImportError::NotFound(_) => StatusCode::NOT_FOUND,
        ImportError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError::new(status, err.to_string())
}
