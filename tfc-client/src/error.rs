//! Client error types.

use thiserror::Error;

/// Errors returned by the remote service client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote object does not exist (or is not visible to this token).
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote service refused the request because of the object's state,
    /// e.g. a safe delete of a workspace that still manages resources.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The remote service throttled the request.
    #[error("rate limited")]
    RateLimited,

    /// Any other non-success response.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected document shape.
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    /// A listing still had pages pending when the page limit was reached.
    #[error("listing incomplete after {pages} pages")]
    Incomplete { pages: u32 },

    /// Client construction failed.
    #[error("config: {0}")]
    Config(String),
}

impl ClientError {
    /// Sentinel used across the engine for "externally removed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Sentinel for "refused while live dependents remain".
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
