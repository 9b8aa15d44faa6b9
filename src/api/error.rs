//! Error types for the backend API.

use thiserror::Error;

/// Errors that can occur while talking to the agent backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    HttpRequest(reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Backend answered with a non-success status.
    #[error("Backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The event stream could not be set up.
    #[error("Stream setup failed: {0}")]
    StreamSetup(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::HttpRequest(err)
        }
    }
}

impl ApiError {
    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::HttpRequest(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Text suitable for an error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status: 500, .. } => {
                "Server internal error, please try again later".to_string()
            }
            Self::Status { status: 404, .. } => {
                "The requested resource does not exist".to_string()
            }
            Self::Timeout => "Request timed out, please check the network connection".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience result alias for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
