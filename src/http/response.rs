//! JSON response envelopes and the HTTP error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::TollgateError;

/// Body of every successful response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

/// Machine-readable error code plus a human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Wrap `data` in the success envelope.
pub fn success<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

/// Build an error envelope response.
pub fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorBody {
            code,
            message: message.into(),
            details: None,
        },
    };
    (status, Json(body)).into_response()
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// The client's quota for the current window is used up
    RateLimitExceeded,
    /// No route matched
    NotFound,
    /// Anything unexpected; the detail is logged, not returned
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::RateLimitExceeded => {
                warn!(code = self.code(), "Application error");
                "Too many requests, please try again later"
            }
            ApiError::NotFound => "Resource not found",
            ApiError::Internal(detail) => {
                error!(error = %detail, "Unexpected error");
                "An unexpected error occurred"
            }
        };

        error_response(self.status(), self.code(), message)
    }
}

impl From<TollgateError> for ApiError {
    fn from(err: TollgateError) -> Self {
        match err {
            TollgateError::RateLimitExceeded { .. } => ApiError::RateLimitExceeded,
            other => ApiError::Internal(other.to_string()),
        }
    }
}
