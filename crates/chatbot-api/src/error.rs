//! Error types for backend API calls.

use std::path::PathBuf;

use serde::Deserialize;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A file to upload could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub detail: serde_json::Value,
}

impl ApiErrorResponse {
    /// Human-readable message; validation errors carry a list.
    pub(crate) fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
