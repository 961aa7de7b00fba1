//! Error types for the agentic RAG services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for provider, scoring and session failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    StreamNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // External provider errors (8xxx)
    UpstreamError,
    ProviderUnavailable,
    ProviderError,
    ScoringFailure,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    Cancelled,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::StreamNotFound => 4006,

            ErrorCode::RateLimited => 6001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::ProviderUnavailable => 8010,
            ErrorCode::ProviderError => 8011,
            ErrorCode::ScoringFailure => 8012,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::Cancelled => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Stream not found: {id}")]
    StreamNotFound { id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Provider errors
    #[error("Provider not configured: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Relevance scoring failed: {message}")]
    ScoringFailure { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session cancelled by consumer")]
    Cancelled,

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a failed provider call
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a provider that has no credentials or endpoint
    pub fn unavailable(provider: impl Into<String>) -> Self {
        AppError::ProviderUnavailable {
            provider: provider.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::StreamNotFound { .. } => ErrorCode::StreamNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            AppError::Provider { .. } => ErrorCode::ProviderError,
            AppError::ScoringFailure { .. } => ErrorCode::ScoringFailure,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::StreamNotFound { .. } => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 499 Client Closed Request
            AppError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),

            // 500 Internal Server Error
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Provider { .. } |
            AppError::ScoringFailure { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
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

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
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
