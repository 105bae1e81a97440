//! Error types for the `OpenAI` API client.

use std::time::Duration;

use thiserror::Error;

use crate::resilience::RetryableError;

/// Errors that can occur when interacting with the `OpenAI` API.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// `OpenAI` returned an error.
    #[error("API error ({error_type}): {message}")]
    Api {
        /// HTTP status of the response.
        status: u16,
        /// Error type from the API.
        error_type: String,
        /// Error message.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Too many recent failures; the call was not attempted.
    #[error("OpenAI circuit open, refusing calls")]
    CircuitOpen,
}

impl RetryableError for OpenAiError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    fn circuit_open() -> Self {
        Self::CircuitOpen
    }
}

/// Error body returned by `OpenAI`.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    /// Nested error details.
    pub error: ApiError,
}

/// Nested error details.
#[derive(Debug, serde::Deserialize)]
pub struct ApiError {
    /// Error type.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error message.
    pub message: String,
}
