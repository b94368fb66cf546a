//! Runtime error types.

use thiserror::Error;

use gantry_framework::{ConfigurationError, DispatchError};

use crate::config::ConfigError;

/// Errors that can occur while wiring or running an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A handler could not be prepared at registration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A dispatch failure that must not be turned into a response.
    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("Handler already registered: {0}")]
    HandlerExists(String),
}

impl From<DispatchError> for RuntimeError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Configuration(err) => Self::Configuration(err),
            other => Self::Dispatch(other),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
