//! Error types for the beacon node HTTP API client.
//!
//! [`ClientError`] covers the three ways a request can go wrong: the node
//! answered with a non-success status, the network failed underneath, or the
//! body did not match the expected shape.

use thiserror::Error;

/// Errors that can occur while talking to a beacon node.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The node returned a non-2xx status, with the response body as message.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Underlying network failure (DNS, connection refused, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response body could not be interpreted.
    #[error("failed to decode response: {0}")]
    Decode(String),
}
