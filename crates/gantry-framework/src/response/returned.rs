//! Handler return values.
//!
//! A handler's Rust return type fixes its [`ReturnKind`] at build time through
//! [`Responder::KIND`]. At run time the value travels as a [`Returned`].

use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tower::BoxError;

use gantry_core::{
    JsonContainer, JsonResponse, NativeResponse, Redirect, Response, ResponseContainer,
};

// =============================================================================
// ReturnKind
// =============================================================================

/// The declared shape of a handler's return value.
///
/// Each kind selects one response strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// A [`ResponseContainer`] that renders itself.
    Container,
    /// A pre-built [`JsonResponse`].
    JsonResponse,
    /// The generic framework [`Response`].
    Response,
    /// A wire-ready [`NativeResponse`].
    NativeResponse,
    /// Any other value, wrapped by the configured response class.
    Plain,
}

impl ReturnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::JsonResponse => "JSON response",
            Self::Response => "response",
            Self::NativeResponse => "native response",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Returned
// =============================================================================

/// A value produced by a handler.
pub enum Returned {
    Value(Value),
    Container(Box<dyn ResponseContainer>),
    Json(JsonResponse),
    Response(Response),
    Native(NativeResponse),
    /// A value that still has to be awaited.
    Deferred(BoxFuture<'static, Result<Returned, BoxError>>),
}

impl Returned {
    /// Wraps a future producing the actual return value.
    pub fn deferred<F, R, E>(fut: F) -> Self
    where
        F: Future<Output = Result<R, E>> + Send + 'static,
        R: Responder,
        E: Into<BoxError>,
    {
        Self::Deferred(
            async move {
                match fut.await {
                    Ok(value) => value.into_returned(),
                    Err(err) => Err(err.into()),
                }
            }
            .boxed(),
        )
    }

    /// The kind this value has at run time.
    pub fn kind(&self) -> ReturnKind {
        match self {
            Self::Value(_) | Self::Deferred(_) => ReturnKind::Plain,
            Self::Container(_) => ReturnKind::Container,
            Self::Json(_) => ReturnKind::JsonResponse,
            Self::Response(_) => ReturnKind::Response,
            Self::Native(_) => ReturnKind::NativeResponse,
        }
    }
}

impl fmt::Debug for Returned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Container(c) => f.debug_tuple("Container").field(c).finish(),
            Self::Json(r) => f.debug_tuple("Json").field(r).finish(),
            Self::Response(r) => f.debug_tuple("Response").field(r).finish(),
            Self::Native(r) => f.debug_tuple("Native").field(r).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

// =============================================================================
// Responder
// =============================================================================

/// Types a handler may return.
///
/// `KIND` is the return declaration used to pick the response strategy.
pub trait Responder: Send + 'static {
    const KIND: ReturnKind;

    fn into_returned(self) -> Result<Returned, BoxError>;
}

/// Serializes any value as a plain return.
///
/// ```rust,ignore
/// async fn list_users(kwargs: Kwargs) -> Result<Json<Vec<User>>, BoxError> {
///     Ok(Json(load_users().await?))
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize + Send + 'static> Responder for Json<T> {
    const KIND: ReturnKind = ReturnKind::Plain;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Value(serde_json::to_value(self.0)?))
    }
}

macro_rules! impl_plain_responder {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Responder for $ty {
                const KIND: ReturnKind = ReturnKind::Plain;

                fn into_returned(self) -> Result<Returned, BoxError> {
                    Ok(Returned::Value(Value::from(self)))
                }
            }
        )*
    };
}

impl_plain_responder!(Value, String, &'static str, bool, i64, u64, f64);

impl Responder for () {
    const KIND: ReturnKind = ReturnKind::Plain;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Value(Value::Null))
    }
}

impl Responder for Returned {
    const KIND: ReturnKind = ReturnKind::Plain;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(self)
    }
}

impl Responder for JsonResponse {
    const KIND: ReturnKind = ReturnKind::JsonResponse;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Json(self))
    }
}

impl Responder for Response {
    const KIND: ReturnKind = ReturnKind::Response;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Response(self))
    }
}

impl Responder for NativeResponse {
    const KIND: ReturnKind = ReturnKind::NativeResponse;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Native(self))
    }
}

impl Responder for Box<dyn ResponseContainer> {
    const KIND: ReturnKind = ReturnKind::Container;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Container(self))
    }
}

impl Responder for Redirect {
    const KIND: ReturnKind = ReturnKind::Container;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Container(Box::new(self)))
    }
}

impl Responder for JsonContainer {
    const KIND: ReturnKind = ReturnKind::Container;

    fn into_returned(self) -> Result<Returned, BoxError> {
        Ok(Returned::Container(Box::new(self)))
    }
}
