//! Unified error types for the Gantry core data model.
//!
//! Dispatch-level errors (configuration, validation, permission) are defined
//! in `gantry-framework`; this module only covers what the response family and
//! the connection abstraction can fail with.

use thiserror::Error;

// =============================================================================
// Response Errors
// =============================================================================

/// Errors that can occur while building a wire response.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    /// A header name could not be represented on the wire.
    #[error("invalid header name '{name}'")]
    InvalidHeaderName {
        /// The offending header name.
        name: String,
    },

    /// A header value could not be represented on the wire.
    #[error("invalid value for header '{name}'")]
    InvalidHeaderValue {
        /// The header whose value was rejected.
        name: String,
    },

    /// The response content could not be serialized.
    #[error("failed to serialize response content: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ResponseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Connection Errors
// =============================================================================

/// Errors raised by a [`Connection`](crate::connection::Connection).
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The peer went away before the body was fully received.
    #[error("connection closed")]
    Closed,
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        Self::BodyRead(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for response building.
pub type ResponseResult<T> = Result<T, ResponseError>;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
