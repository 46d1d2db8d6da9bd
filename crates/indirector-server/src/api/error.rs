//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use indirector_core::IndirectorError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Detail is logged, never sent
    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Forbidden(msg) => {
                warn!(reason = %msg, "Denied request");
                (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::MethodNotAllowed(msg) => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                msg.clone(),
            ),
            ApiError::NotAcceptable(msg) => {
                (StatusCode::NOT_ACCEPTABLE, "NOT_ACCEPTABLE", msg.clone())
            }
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<IndirectorError> for ApiError {
    fn from(err: IndirectorError) -> Self {
        match err {
            IndirectorError::Validation(msg) => ApiError::BadRequest(msg),
            IndirectorError::Authorization(msg) => ApiError::Forbidden(msg),
            IndirectorError::NotFound(msg) => ApiError::NotFound(msg),
            IndirectorError::MethodNotAllowed(msg) => ApiError::MethodNotAllowed(msg),
            IndirectorError::NotAcceptable(msg) => ApiError::NotAcceptable(msg),
            IndirectorError::UnsupportedMediaType(msg) => ApiError::UnsupportedMediaType(msg),
            IndirectorError::OperationNotSupported { indirection, .. } => {
                ApiError::NotFound(format!("No handler for {}", indirection))
            }
            other @ (IndirectorError::Terminus { .. } | IndirectorError::Dev(_)) => {
                ApiError::Internal(other.to_string())
            }
        }
    }
}
