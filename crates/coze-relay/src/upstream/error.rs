//! Upstream client error types.

use thiserror::Error;

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors that can occur while talking to the chat provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider answered with an error payload.
    #[error("Coze error: {message} (code: {code})")]
    ApiError { message: String, code: String },

    /// Provider answered with a non-success status.
    #[error("Coze returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The event stream could not be decoded.
    #[error("Malformed event stream: {0}")]
    Protocol(String),

    /// An event payload was not valid JSON.
    #[error("Failed to parse {event} event: {message}")]
    ParseError { event: String, message: String },

    /// No API token configured.
    #[error("Coze API token is not configured")]
    MissingToken,
}
