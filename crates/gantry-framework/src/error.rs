//! Error types for the Gantry dispatch pipeline.
//!
//! The taxonomy follows how each failure has to be treated:
//!
//! - [`ConfigurationError`] is fatal. It surfaces when a handler is built or on
//!   its first dispatch and is never turned into a response.
//! - [`ValidationError`] and [`PermissionDenied`] are per-request failures the
//!   exception-handling layer turns into well-formed error responses.
//! - Handler and dependency failures carry the user's own error so exception
//!   handlers keyed by error type can match on it.
//!
//! [`DispatchError`] is the umbrella returned by every dispatch entry point.

use std::error::Error as StdError;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;

use gantry_core::{ConnectionError, ResponseError};

use crate::response::ReturnKind;
use crate::signature::ParamSource;

// =============================================================================
// ConfigurationError
// =============================================================================

/// A handler, layer or dependency is wired incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The same provider is bound under two different keys.
    #[error(
        "injector for key '{key}' is already defined under the different key '{existing}'; \
         to override an injector, bind it under the same key"
    )]
    DuplicateInjector { key: String, existing: String },

    /// Dependencies were requested before the signature model was built.
    #[error("dependencies of '{handler}' cannot be resolved before its signature model is built")]
    SignatureModelMissing { handler: String },

    #[error("'{handler}' declares path parameter '{name}' which is not in its path pattern")]
    UnknownPathParameter { handler: String, name: String },

    #[error("'{handler}' requires dependency '{key}' but no layer provides it")]
    MissingDependency { handler: String, key: String },

    #[error("dependency cycle detected: {path}")]
    DependencyCycle { path: String },

    #[error("parameter '{name}' is declared both as {first} and as {second}")]
    ConflictingParameter {
        name: String,
        first: ParamSource,
        second: ParamSource,
    },

    #[error("parameter '{name}' is declared more than once")]
    DuplicateParameter { name: String },

    /// Body parameters must be called `data` or `payload`.
    #[error("body parameter must be named 'data' or 'payload', got '{name}'")]
    InvalidBodyParameter { name: String },

    #[error("'{handler}' declares more than one body parameter")]
    MultipleBodyParameters { handler: String },

    /// A handler uses a method its controller does not allow.
    #[error("'{handler}' uses method {method}, but its controller only allows [{allowed}]")]
    MethodNotAllowed {
        handler: String,
        method: String,
        allowed: String,
    },

    #[error("no handler named '{name}'")]
    MissingHandler { name: String },
}

// =============================================================================
// ValidationError
// =============================================================================

/// One parameter that failed coercion or validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub location: ParamSource,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(
        location: ParamSource,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            location,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Raw connection values did not satisfy the signature model.
///
/// Every failing field is reported, not just the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation error(s): {}", .errors.len(), summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(
        location: ParamSource,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![FieldError::new(location, field, message)])
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}.{}: {}", e.location, e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// PermissionDenied
// =============================================================================

/// A permission check rejected the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied by '{permission}'")]
pub struct PermissionDenied {
    pub permission: String,
    pub detail: Option<String>,
}

// =============================================================================
// ExtractError
// =============================================================================

/// Errors raised while pulling typed values out of handler arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no argument named '{name}'")]
    Missing { name: String },

    /// The argument exists but holds another type.
    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("argument '{name}' could not be deserialized: {message}")]
    Deserialize { name: String, message: String },

    /// The handler asked for its owner but is not bound to one of that type.
    #[error("handler is not owned by a '{expected}'")]
    MissingOwner { expected: &'static str },

    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

// =============================================================================
// DispatchError
// =============================================================================

/// Everything that can go wrong while dispatching a connection to a handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A dependency provider failed.
    #[error("dependency '{key}' failed: {source}")]
    Dependency {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The handler body itself failed.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The returned value does not have the shape the handler declared.
    #[error("handler declared a {expected} return but produced a {got} value")]
    ReturnTypeMismatch {
        expected: ReturnKind,
        got: ReturnKind,
    },

    /// The connection was cancelled mid-dispatch.
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Wraps a boxed handler error, unwrapping extraction failures.
    pub fn from_handler(err: BoxError) -> Self {
        match err.downcast::<ExtractError>() {
            Ok(extract) => Self::Extract(*extract),
            Err(err) => Self::Handler(err),
        }
    }

    /// The HTTP status an error response for this failure should carry.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors that must abort dispatch instead of being
    /// mapped to a response.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// The most specific underlying error, used to match exception handlers
    /// keyed by error type.
    pub fn exception(&self) -> &(dyn StdError + 'static) {
        match self {
            Self::Configuration(e) => e,
            Self::Validation(e) => e,
            Self::PermissionDenied(e) => e,
            Self::Extract(e) => e,
            Self::Dependency { source, .. } => source.as_ref(),
            Self::Handler(e) => e.as_ref(),
            Self::Response(e) => e,
            Self::Connection(e) => e,
            Self::ReturnTypeMismatch { .. } | Self::Cancelled => self,
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
