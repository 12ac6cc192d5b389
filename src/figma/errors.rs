//! Figma API Error Types
//!
//! Structured error handling for Figma REST API operations.
//! Maps HTTP status codes to specific error variants for retry decisions.

/// Figma API error types
#[derive(Debug, thiserror::Error)]
pub enum FigmaError {
    #[error("Unauthorized: check FIGMA_API_KEY or FIGMA_OAUTH_TOKEN")]
    Unauthorized,

    #[error("Rate limited by the Figma API")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl FigmaError {
    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FigmaError::RateLimited
                | FigmaError::Timeout
                | FigmaError::Network(_)
                | FigmaError::Server(_, _)
        )
    }

    /// Create a FigmaError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => FigmaError::Unauthorized,
            403 => FigmaError::Forbidden(body.to_string()),
            404 => FigmaError::NotFound(body.to_string()),
            408 => FigmaError::Timeout,
            429 => FigmaError::RateLimited,
            500..=599 => FigmaError::Server(status, body.to_string()),
            _ => FigmaError::Request(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FigmaError::Timeout
        } else if err.is_connect() || err.is_request() {
            FigmaError::Network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            FigmaError::Decode(err.to_string())
        } else {
            FigmaError::Request(err.to_string())
        }
    }
}
