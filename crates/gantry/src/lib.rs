//! # Gantry
//!
//! A typed handler dispatch framework: dependency injection, permissions and
//! response coercion for already-routed requests.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌─────────────┐     ┌──────────────────────────────────────┐
//! │ Connection │────▶│ Application │────▶│ RouteHandler                         │
//! │  (routed)  │     │  (runtime)  │     │  permissions → kwargs → dependencies │
//! └────────────┘     └─────────────┘     │  → handler fn → response handler     │
//!                                        └──────────────────────────────────────┘
//! ```
//!
//! - **Layers**: application, group and controller layers carry dependencies,
//!   permissions, exception handlers and response defaults down to handlers
//! - **Handlers**: plain async or sync functions (Axum-style), whose return
//!   type selects how the result becomes a response
//! - **Application**: registers handlers at startup and maps failures to
//!   error responses
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gantry::prelude::*;
//!
//! async fn get_user(kwargs: Kwargs) -> Result<Value, BoxError> {
//!     let db = kwargs.dependency::<Db>("db")?;
//!     Ok(db.user(kwargs.get("user_id")?).await?)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let app = Application::from_config(&config);
//!
//!     app.route(
//!         RouteHandler::builder("get_user", "/users/{user_id}")
//!             .owner(app.root())
//!             .param(Param::path("user_id", ParamType::Integer))
//!             .param(Param::dependency("db"))
//!             .dependency("db", Inject::value(Db::connect()))
//!             .handler(get_user)
//!             .build()?,
//!     )?;
//!
//!     let request = Request::builder(Method::GET, "/users/7").path_param("user_id", "7");
//!     let response = app.handle("get_user", request.build().into_connection()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use gantry_core as core;
pub use gantry_framework as framework;
pub use gantry_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use gantry_runtime::{Application, GantryConfig, RuntimeError, load_config};

    // Layers and handlers
    pub use gantry_framework::{
        Body, BoxError, Dependencies, DispatchError, ExceptionKey, Inject, Json, Kwargs, Layer,
        Owner, Param, ParamType, Permission, PermissionClass, Returned, RouteHandler,
    };

    // Connection and response types
    pub use gantry_core::{
        Connection, Cookie, JsonResponse, MediaType, Method, NativeResponse, Redirect, Request,
        Response, State, StatusCode,
    };

    pub use serde_json::Value;
}
