//! Shared HTTP response types
//!
//! Error bodies and the mapping from [`FormsError`] to status codes. Storage
//! failures are logged with their full error chain and answered with a generic
//! message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::FormsError;

/// Standard error response format for HTTP API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    /// Create a new error response with error code and message
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    /// Create an internal server error response
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new("internal_server_error", message)
    }

    /// Create a bad request error response
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    /// Create a not found error response
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }
}

/// Simple `{ "message": ... }` acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_responses: Option<u64>,
}

impl FormsError {
    fn status_and_body(&self) -> (StatusCode, ErrorResponse) {
        match self {
            FormsError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(message))
            }
            FormsError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorResponse::not_found(message))
            }
            FormsError::Storage(e) => {
                error!(error_chain = %format!("{e:#}"), "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::internal_server_error("An unexpected error occurred"),
                )
            }
        }
    }
}

impl IntoResponse for FormsError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new("test_error", "Test message");
        assert_eq!(error.error, "test_error");
        assert_eq!(error.message, "Test message");
    }

    #[test]
    fn test_status_mapping() {
        let (status, body) = FormsError::invalid("Invalid form ID format").status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "bad_request");

        let (status, body) = FormsError::not_found("Form not found").status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Form not found");
    }

    #[test]
    fn test_storage_failure_is_not_leaked() {
        let err = FormsError::from(anyhow::anyhow!("password authentication failed for user"));
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "internal_server_error");
        assert!(!body.message.contains("password"));
    }

    #[test]
    fn test_message_response_skips_missing_count() {
        let json = serde_json::to_string(&MessageResponse {
            message: "ok".into(),
            deleted_responses: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"message":"ok"}"#);
    }
}
