//! Error types for the Folio Assistant services
//!
//! Provides:
//! - Distinct error types for client input, provider, and startup failures
//! - HTTP status code mapping
//! - A public message per error that never carries internal detail
//! - Error codes for log correlation

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Message returned for every request that fails on the server side.
pub const APOLOGY_MESSAGE: &str = "Failed to get a response from the AI.";

/// Message returned when the chat message is absent or empty.
pub const MESSAGE_REQUIRED: &str = "Message is required.";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors (1xxx)
    MethodNotAllowed,
    MissingField,
    ValidationError,
    RateLimited,
    PayloadTooLarge,

    // Provider errors (8xxx)
    ProviderOverloaded,
    ProviderError,
    ProviderTimeout,
    RetriesExhausted,
    DeadlineExceeded,
    UpstreamError,

    // Startup errors (9xxx)
    ConfigurationError,
    KnowledgeBaseError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::MethodNotAllowed => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::ValidationError => 1003,
            ErrorCode::RateLimited => 1004,
            ErrorCode::PayloadTooLarge => 1005,

            ErrorCode::ProviderOverloaded => 8001,
            ErrorCode::ProviderError => 8002,
            ErrorCode::ProviderTimeout => 8003,
            ErrorCode::RetriesExhausted => 8004,
            ErrorCode::DeadlineExceeded => 8005,
            ErrorCode::UpstreamError => 8006,

            ErrorCode::ConfigurationError => 9001,
            ErrorCode::KnowledgeBaseError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Client errors
    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Message exceeds {limit} characters")]
    MessageTooLong { limit: u64 },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request body rejected: {message}")]
    PayloadTooLarge { message: String },

    // Language-model provider errors
    #[error("Provider overloaded: {message}")]
    ProviderOverloaded { message: String },

    #[error("Provider error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },

    #[error("Provider timeout after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    #[error("Provider still failing after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Request deadline of {timeout_ms}ms exceeded")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Startup errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Knowledge base error: {message}")]
    KnowledgeBase { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::MethodNotAllowed { .. } => ErrorCode::MethodNotAllowed,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::MessageTooLong { .. } => ErrorCode::ValidationError,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::ProviderOverloaded { .. } => ErrorCode::ProviderOverloaded,
            AppError::Provider { .. } => ErrorCode::ProviderError,
            AppError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            AppError::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            AppError::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::KnowledgeBase { .. } => ErrorCode::KnowledgeBaseError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,

            AppError::MissingField { .. } |
            AppError::MessageTooLong { .. } => StatusCode::BAD_REQUEST,

            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // Provider failures are never surfaced with their upstream status
            AppError::ProviderOverloaded { .. } |
            AppError::Provider { .. } |
            AppError::ProviderTimeout { .. } |
            AppError::RetriesExhausted { .. } |
            AppError::DeadlineExceeded { .. } |
            AppError::HttpClient(_) |
            AppError::Configuration { .. } |
            AppError::KnowledgeBase { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text placed in the response body.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::MethodNotAllowed { .. } => "Method Not Allowed",
            AppError::MissingField { .. } => MESSAGE_REQUIRED,
            AppError::MessageTooLong { .. } => "Message is too long.",
            AppError::RateLimited => "Too many requests. Please slow down.",
            AppError::PayloadTooLarge { .. } => "Request body is too large.",
            _ => APOLOGY_MESSAGE,
        }
    }

    /// Whether the language model signalled a transient overload.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, AppError::ProviderOverloaded { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Error body returned by the API: `{"message": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let detail = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %detail,
                code = ?code,
                code_num = code.as_code(),
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %detail,
                code = ?code,
                code_num = code.as_code(),
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            message: self.public_message().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge {
                message: rejection.body_text(),
            }
        } else {
            AppError::MissingField {
                field: "message".to_string(),
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_mapping() {
        let err = AppError::MethodNotAllowed { method: "GET".into() };
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.public_message(), "Method Not Allowed");
        assert!(err.is_client_error());

        let err = AppError::MissingField { field: "message".into() };
        assert_eq!(err.code(), ErrorCode::MissingField);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Message is required.");

        let err = AppError::PayloadTooLarge { message: "length limit exceeded".into() };
        assert_eq!(err.code().as_code(), 1005);
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.public_message(), "Request body is too large.");
    }

    #[test]
    fn test_provider_errors_hide_detail() {
        let err = AppError::Provider {
            status: Some(401),
            message: "API key not valid".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), APOLOGY_MESSAGE);
        assert!(!err.public_message().contains("API key"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_only_overload_is_retryable() {
        assert!(AppError::ProviderOverloaded { message: "busy".into() }.is_overloaded());
        assert!(!AppError::ProviderTimeout { timeout_ms: 10 }.is_overloaded());
        assert!(!AppError::Provider { status: Some(500), message: "boom".into() }.is_overloaded());
    }

    #[tokio::test]
    async fn test_response_body_is_message_only() {
        let response = AppError::RetriesExhausted {
            attempts: 5,
            last_error: "upstream 503".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "message": APOLOGY_MESSAGE }));
    }
}
