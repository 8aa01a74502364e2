//! Application error type mapping to HTTP status codes.
//!
//! Caller errors carry their message through; dependency faults are logged
//! in full and answered with a generic body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use kindred_types::error::ChatError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors surfaced by chat services.
    Chat(ChatError),
    /// Request validation error.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Chat(ChatError::UnknownUser) => {
                (StatusCode::NOT_FOUND, "User not found".to_string())
            }
            AppError::Chat(e @ ChatError::UnknownPersona(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Chat(e @ ChatError::MissingField(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Chat(ChatError::QuotaExceeded) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Daily message limit exceeded. Try again tomorrow.".to_string(),
            ),
            AppError::Chat(ChatError::Dependency(detail)) => {
                tracing::error!(detail = %detail, "dependency failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Chat(ChatError::UnknownUser), StatusCode::NOT_FOUND),
            (
                AppError::Chat(ChatError::UnknownPersona("zed".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Chat(ChatError::MissingField("message")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Chat(ChatError::QuotaExceeded),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::Chat(ChatError::Dependency("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Validation("bad input".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
