//! # Gantry Framework
//!
//! The handler dispatch core: everything between an already-routed
//! [`Connection`](gantry_core::Connection) and the
//! [`NativeResponse`](gantry_core::NativeResponse) sent back.
//!
//! This layer provides:
//! - Ownership layers (application, group, controller) carrying inherited settings
//! - Parameter declarations and the signature model validating them
//! - Dependency injection with topologically ordered providers
//! - Permission evaluation, in order and short-circuiting
//! - Response coercion for every supported return declaration
//! - Axum-style handler functions and a tower [`Service`](tower::Service) adapter
//!
//! ```text
//! Connection ─▶ permissions ─▶ kwargs ─▶ dependencies ─▶ handler ─▶ response handler
//! ```

pub mod error;
pub mod exception;
pub mod handler;
pub mod inject;
pub mod kwargs;
pub mod layer;
pub mod permission;
pub mod response;
pub mod signature;
pub mod sync;

pub use error::{
    ConfigurationError, DispatchError, DispatchResult, ExtractError, ExtractResult, FieldError,
    PermissionDenied, ValidationError,
};
pub use exception::{ExceptionHandler, ExceptionHandlers, ExceptionKey};
pub use handler::{
    Arguments, Body, FromArguments, Handler, HandlerFn, HandlerService, Owner, RouteHandler,
    RouteHandlerBuilder, SyncHandler, parse_path_parameters,
};
pub use inject::{Dependencies, Inject, ProviderFn};
pub use kwargs::{ExpectedParam, Injected, Kwargs, KwargsModel, RawKwargs, ResolvedDependency};
pub use layer::{Layer, LayerBuilder, LayerKind, LayerSettings, OwnershipLayer};
pub use permission::{AllowAny, DenyAll, Permission, PermissionClass};
pub use response::{
    Json, Responder, ResponseHandler, ResponseHandlerBuilder, ReturnKind, Returned, get_headers,
    merge_cookies, merge_headers,
};
pub use signature::{BODY_PARAM_NAMES, Param, ParamSource, ParamType, SignatureModel};
pub use sync::Callable;

pub use tower::BoxError;

/// Prelude for writing handlers.
pub mod prelude {
    pub use super::{
        BoxError, Body, Dependencies, DispatchError, Inject, Json, Kwargs, Layer, Owner, Param,
        ParamType, Permission, PermissionClass, Returned, RouteHandler,
    };
}
