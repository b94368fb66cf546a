//! Handler functions.
//!
//! Handlers are plain functions. Their arguments are pulled out of the
//! dispatch [`Arguments`] by [`FromArguments`] implementations, and their
//! return type fixes the handler's [`ReturnKind`]. As in Axum, this works
//! through blanket implementations over function arities:
//!
//! ```rust,ignore
//! // Async handler reading validated kwargs
//! async fn get_user(kwargs: Kwargs) -> Result<Json<User>, BoxError> {
//!     let id: i64 = kwargs.get("user_id")?;
//!     Ok(Json(load_user(id).await?))
//! }
//!
//! // Sync handler on a controller, receiving its owner first
//! fn list_items(owner: Owner<ItemsController>, kwargs: Kwargs) -> Result<Value, BoxError> {
//!     Ok(owner.list(kwargs.get("page")?))
//! }
//!
//! let handler = RouteHandler::builder("get_user", "/users/{user_id}")
//!     .param(Param::path("user_id", ParamType::Integer))
//!     .handler(get_user)
//!     .build()?;
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tower::BoxError;

use gantry_core::Connection;

use crate::error::{ExtractError, ExtractResult};
use crate::kwargs::Kwargs;
use crate::response::{Responder, ReturnKind, Returned};
use crate::signature::BODY_PARAM_NAMES;
use crate::sync::Callable;

/// The type-erased handler function stored by a route handler.
pub type HandlerFn = Callable<Arguments, Result<Returned, BoxError>>;

// =============================================================================
// Arguments
// =============================================================================

/// Everything a handler function can draw its arguments from.
#[derive(Clone)]
pub struct Arguments {
    owner: Option<Arc<dyn Any + Send + Sync>>,
    kwargs: Kwargs,
    connection: Arc<dyn Connection>,
}

impl Arguments {
    pub fn new(connection: Arc<dyn Connection>, kwargs: Kwargs) -> Self {
        Self {
            owner: None,
            kwargs,
            connection,
        }
    }

    /// Binds the controller instance the handler belongs to.
    pub fn with_owner(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn owner(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.owner.as_ref()
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner.is_some())
            .field("kwargs", &self.kwargs)
            .field("path", &self.connection.path())
            .finish()
    }
}

// =============================================================================
// FromArguments
// =============================================================================

/// Extracts one handler argument.
pub trait FromArguments: Sized + Send + 'static {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self>;
}

impl FromArguments for Kwargs {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self> {
        Ok(args.kwargs.clone())
    }
}

impl FromArguments for Arc<dyn Connection> {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self> {
        Ok(Arc::clone(&args.connection))
    }
}

/// Absent arguments become `None` instead of failing the call.
impl<T: FromArguments> FromArguments for Option<T> {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self> {
        Ok(T::from_arguments(args).ok())
    }
}

/// The controller instance a handler is owned by.
#[derive(Debug)]
pub struct Owner<T>(pub Arc<T>);

impl<T> Deref for Owner<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> FromArguments for Owner<T> {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self> {
        args.owner
            .clone()
            .and_then(|owner| owner.downcast::<T>().ok())
            .map(Owner)
            .ok_or(ExtractError::MissingOwner {
                expected: type_name::<T>(),
            })
    }
}

/// The validated request body, deserialized.
#[derive(Debug, Clone)]
pub struct Body<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromArguments for Body<T> {
    fn from_arguments(args: &Arguments) -> ExtractResult<Self> {
        let name = BODY_PARAM_NAMES
            .iter()
            .find(|name| args.kwargs.contains(name))
            .ok_or_else(|| ExtractError::Missing {
                name: BODY_PARAM_NAMES[0].to_string(),
            })?;
        args.kwargs.get(name).map(Body)
    }
}

// =============================================================================
// Handler traits
// =============================================================================

/// An async function usable as a route handler.
///
/// Implemented for `async fn`s and closures returning futures, taking up to
/// eight [`FromArguments`] parameters and resolving to `Result<R, E>` where
/// `R: Responder`.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The return declaration derived from `R`.
    const RETURN_KIND: ReturnKind;

    fn into_handler_fn(self) -> HandlerFn;
}

/// A synchronous function usable as a route handler.
pub trait SyncHandler<T>: Send + Sync + 'static {
    const RETURN_KIND: ReturnKind;

    fn into_handler_fn(self) -> HandlerFn;
}

fn extract<T: FromArguments>(args: &Arguments) -> Result<T, BoxError> {
    T::from_arguments(args).map_err(BoxError::from)
}

fn finish<R: Responder, E: Into<BoxError>>(result: Result<R, E>) -> Result<Returned, BoxError> {
    match result {
        Ok(value) => value.into_returned(),
        Err(err) => Err(err.into()),
    }
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, Fut, R, E, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Responder,
            E: Into<BoxError> + 'static,
            $( $ty: FromArguments, )*
        {
            const RETURN_KIND: ReturnKind = R::KIND;

            fn into_handler_fn(self) -> HandlerFn {
                Callable::from_async(move |args: Arguments| {
                    let handler = self.clone();
                    async move {
                        $(
                            let $ty = extract::<$ty>(&args)?;
                        )*
                        finish(handler($($ty,)*).await)
                    }
                })
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<F, R, E, $($ty,)*> SyncHandler<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Result<R, E> + Send + Sync + 'static,
            R: Responder,
            E: Into<BoxError> + 'static,
            $( $ty: FromArguments, )*
        {
            const RETURN_KIND: ReturnKind = R::KIND;

            fn into_handler_fn(self) -> HandlerFn {
                Callable::from_sync(move |args: Arguments| {
                    $(
                        let $ty = extract::<$ty>(&args)?;
                    )*
                    finish(self($($ty,)*))
                })
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{Method, Redirect, Request};
    use serde_json::{Value, json};

    struct Controller {
        prefix: &'static str,
    }

    fn args(kwargs: Kwargs) -> Arguments {
        let connection = Request::builder(Method::GET, "/").build().into_connection();
        Arguments::new(connection, kwargs)
    }

    fn kind_of<T, H: Handler<T>>(_: &H) -> ReturnKind {
        H::RETURN_KIND
    }

    fn sync_kind_of<T, H: SyncHandler<T>>(_: &H) -> ReturnKind {
        H::RETURN_KIND
    }

    #[test]
    fn test_return_kind_follows_return_type() {
        async fn plain() -> Result<Value, BoxError> {
            Ok(json!(null))
        }
        async fn redirect(_: Kwargs) -> Result<Redirect, BoxError> {
            Ok(Redirect::to("/"))
        }
        fn sync_text(_: Kwargs, _: Arc<dyn Connection>) -> Result<String, BoxError> {
            Ok(String::new())
        }

        assert_eq!(kind_of(&plain), ReturnKind::Plain);
        assert_eq!(kind_of(&redirect), ReturnKind::Container);
        assert_eq!(sync_kind_of(&sync_text), ReturnKind::Plain);
    }

    #[tokio::test]
    async fn test_owner_is_passed_first() {
        fn greet(owner: Owner<Controller>, kwargs: Kwargs) -> Result<String, BoxError> {
            Ok(format!("{}{}", owner.prefix, kwargs.len()))
        }

        let handler_fn = SyncHandler::into_handler_fn(greet);
        assert!(!handler_fn.is_async());

        let owner: Arc<dyn Any + Send + Sync> = Arc::new(Controller { prefix: "n=" });
        let returned = handler_fn
            .call(args(Kwargs::default()).with_owner(owner))
            .await
            .unwrap();
        assert!(matches!(returned, Returned::Value(Value::String(s)) if s == "n=0"));
    }

    #[tokio::test]
    async fn test_missing_owner_is_an_extract_error() {
        async fn needs_owner(_: Owner<Controller>) -> Result<(), BoxError> {
            Ok(())
        }

        let handler_fn = Handler::into_handler_fn(needs_owner);
        assert!(handler_fn.is_async());

        let err = handler_fn.call(args(Kwargs::default())).await.unwrap_err();
        let err = err.downcast::<ExtractError>().unwrap();
        assert!(matches!(*err, ExtractError::MissingOwner { .. }));
    }

    #[tokio::test]
    async fn test_optional_argument_tolerates_absence() {
        async fn maybe(owner: Option<Owner<Controller>>) -> Result<bool, BoxError> {
            Ok(owner.is_some())
        }

        let returned = Handler::into_handler_fn(maybe)
            .call(args(Kwargs::default()))
            .await
            .unwrap();
        assert!(matches!(returned, Returned::Value(Value::Bool(false))));
    }
}
