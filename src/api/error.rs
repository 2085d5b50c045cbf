//! Error types shared by authority implementations.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`ApiError`] failures.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures that can occur while talking to the authority.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent or its body could not be read.
    #[error("failed to send request to `{path}`")]
    Send {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Authenticated but not authorised for this game (403).
    #[error("access to `{path}` is forbidden")]
    Forbidden { path: String },
    /// The bearer credential is missing or expired (401).
    #[error("not authenticated for `{path}`")]
    Unauthenticated { path: String },
    /// Any other non-success status.
    #[error("unexpected response status {status} for `{path}`")]
    Status {
        path: String,
        status: StatusCode,
        /// Explanation extracted from the response body, if any.
        message: Option<String>,
    },
    /// The response body was not the expected JSON.
    #[error("failed to decode response for `{path}`")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Whether this is the 403 "no access to this game" failure.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Forbidden { .. })
    }

    /// Text suitable for showing to the player.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}
