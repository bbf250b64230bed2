//! Shared error types for REST calls against the scan API.

use serde::{Deserialize, Serialize};

/// Error body returned by the API for non-2xx responses (`{"detail": "..."}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

/// Attempt to pull a user-facing message out of an error response body.
/// Returns `None` when the body is not JSON or `detail` is missing or blank.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    parsed.detail.filter(|d| !d.trim().is_empty())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    /// Non-2xx response. `message` is the server's `detail` when available,
    /// otherwise a generic message for the operation.
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Build a [`ApiError::Server`] from a failed response body.
    pub fn from_response(status: u16, body: &str, fallback: &str) -> Self {
        ApiError::Server {
            status,
            message: try_error_detail(body).unwrap_or_else(|| fallback.to_string()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
