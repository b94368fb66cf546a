//! The application: handler registration and error mapping.
//!
//! An [`Application`] owns the root [`Layer`], the shared [`State`] and every
//! registered [`RouteHandler`]. Handlers are prepared when they are routed,
//! so a bad signature fails at startup instead of on the first request.
//!
//! ```rust,ignore
//! let config = load_config()?;
//! let app = Application::from_config(&config);
//!
//! app.route(
//!     RouteHandler::builder("get_user", "/users/{user_id}")
//!         .owner(app.root())
//!         .param(Param::path("user_id", ParamType::Integer))
//!         .handler(get_user)
//!         .build()?,
//! )?;
//!
//! let response = app.handle("get_user", connection).await?;
//! ```
//!
//! Failures are turned into responses as follows:
//!
//! | Failure               | Response                                   |
//! |-----------------------|--------------------------------------------|
//! | has exception handler | whatever the exception handler returns     |
//! | validation            | 400 `{"detail", "status_code", "errors"}`  |
//! | permission denied     | 403 `{"detail", "status_code"}`            |
//! | anything else         | 500 `{"detail", "status_code"}`            |
//! | configuration         | not a response, returned as [`RuntimeError`] |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use gantry_core::{Connection, JsonResponse, NativeResponse, State};
use gantry_framework::{DispatchError, HandlerService, Layer, LayerBuilder, RouteHandler};

use crate::config::GantryConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Seeds an application layer with the configured response headers and cookies.
pub fn root_layer(config: &GantryConfig) -> LayerBuilder {
    let mut builder = Layer::application(config.app.name.as_str());
    for (name, value) in &config.response.headers {
        builder = builder.response_header(name.as_str(), value.as_str());
    }
    for cookie in &config.response.cookies {
        builder = builder.response_cookie(cookie.clone());
    }
    builder
}

pub struct Application {
    root: Arc<Layer>,
    state: State,
    debug: bool,
    handlers: RwLock<BTreeMap<String, Arc<RouteHandler>>>,
}

impl Application {
    pub fn new(root: Arc<Layer>) -> Self {
        Self {
            root,
            state: State::new(),
            debug: false,
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_config(config: &GantryConfig) -> Self {
        Self::new(root_layer(config).build()).debug(config.app.debug)
    }

    /// Exposes error messages in default 500 responses.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// The application layer, to be used as the outermost owner.
    pub fn root(&self) -> &Arc<Layer> {
        &self.root
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Registers a handler under its name.
    ///
    /// Builds the handler's signature and kwargs models and warms every
    /// merged-settings cache. Configuration errors are returned here.
    pub fn route(&self, handler: Arc<RouteHandler>) -> RuntimeResult<()> {
        let name = handler.name().to_string();
        if self.handlers.read().contains_key(&name) {
            return Err(RuntimeError::HandlerExists(name));
        }

        let rooted = handler
            .owner()
            .and_then(|owner| owner.chain().into_iter().next())
            .is_some_and(|root| Arc::ptr_eq(&root, &self.root));
        if !rooted {
            warn!(handler = %name, "Handler is not owned by the application layer");
        }

        let kwargs_model = handler.kwargs_model()?;
        handler.resolve_permissions();
        handler.get_exception_handlers();
        handler.get_response_handler();

        info!(
            handler = %name,
            path = %handler.path(),
            methods = %handler.allow_header(),
            dependencies = kwargs_model.expected_dependencies().len(),
            "Registered route handler"
        );

        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(RuntimeError::HandlerExists(name));
        }
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn handler(&self, name: &str) -> Option<Arc<RouteHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Dispatches `connection` to the named handler and maps failures to
    /// error responses.
    pub async fn handle(
        &self,
        name: &str,
        connection: Arc<dyn Connection>,
    ) -> RuntimeResult<NativeResponse> {
        let handler = self
            .handler(name)
            .ok_or_else(|| RuntimeError::HandlerNotFound(name.to_string()))?;

        match handler
            .get_response_for_request(Arc::clone(&connection), &self.state)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => self.map_error(&handler, connection.as_ref(), err),
        }
    }

    /// The registered handler as a tower service.
    ///
    /// The service yields raw [`DispatchError`]s; exception handlers are not
    /// applied.
    pub fn service(&self, name: &str) -> RuntimeResult<HandlerService> {
        let handler = self
            .handler(name)
            .ok_or_else(|| RuntimeError::HandlerNotFound(name.to_string()))?;
        Ok(HandlerService::new(handler, self.state.clone()))
    }

    fn map_error(
        &self,
        handler: &RouteHandler,
        connection: &dyn Connection,
        err: DispatchError,
    ) -> RuntimeResult<NativeResponse> {
        let exception_handlers = handler.get_exception_handlers();
        if let Some(exception_handler) = exception_handlers.lookup(&err) {
            debug!(handler = %handler.name(), error = %err, "Mapped by exception handler");
            return Ok(exception_handler(connection, &err));
        }

        let status = err.status_code();
        if status.is_server_error() {
            error!(handler = %handler.name(), error = %err, "Unhandled dispatch failure");
        } else {
            debug!(handler = %handler.name(), error = %err, "Rejected connection");
        }

        let body = self.error_body(&err, status);
        let response = JsonResponse::new(&body).map_err(DispatchError::from)?;
        Ok(response.with_status(status).into_native())
    }

    fn error_body(&self, err: &DispatchError, status: StatusCode) -> Value {
        match err {
            DispatchError::Validation(validation) => json!({
                "detail": validation.to_string(),
                "status_code": status.as_u16(),
                "errors": validation.errors,
            }),
            DispatchError::PermissionDenied(denied) => json!({
                "detail": denied.detail.clone().unwrap_or_else(|| denied.to_string()),
                "status_code": status.as_u16(),
            }),
            other => {
                let detail = if self.debug {
                    other.to_string()
                } else {
                    status
                        .canonical_reason()
                        .unwrap_or("Internal Server Error")
                        .to_string()
                };
                json!({ "detail": detail, "status_code": status.as_u16() })
            }
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("root", &self.root.name())
            .field("debug", &self.debug)
            .field("handlers", &self.handlers.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{Cookie, Method, Request};
    use gantry_framework::{
        BoxError, ConfigurationError, DenyAll, ExceptionKey, Kwargs, Param, ParamType,
        PermissionClass,
    };
    use tower::ServiceExt;

    #[derive(Debug, thiserror::Error)]
    #[error("out of stock")]
    struct OutOfStock;

    async fn page(kwargs: Kwargs) -> Result<Value, BoxError> {
        Ok(json!({ "page": kwargs.get::<i64>("page")? }))
    }

    async fn fail() -> Result<Value, BoxError> {
        Err(Box::new(OutOfStock))
    }

    fn config() -> GantryConfig {
        let mut config = GantryConfig::default();
        config.app.name = "shop".into();
        config
            .response
            .headers
            .insert("x-frame-options".into(), "DENY".into());
        config.response.cookies.push(Cookie::new("region", "eu"));
        config
    }

    fn get(path: &str) -> Arc<dyn Connection> {
        Request::builder(Method::GET, path).build().into_connection()
    }

    #[tokio::test]
    async fn test_root_settings_come_from_config() {
        let app = Application::from_config(&config());
        assert_eq!(app.root().name(), "shop");

        let handler = RouteHandler::builder("page", "/items")
            .owner(app.root())
            .param(Param::query("page", ParamType::Integer).default(1))
            .handler(page)
            .build()
            .unwrap();
        app.route(handler).unwrap();

        let response = app.handle("page", get("/items")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json().unwrap(), json!({"page": 1}));
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
        assert!(response.set_cookies()[0].starts_with("region=eu"));
    }

    #[test]
    fn test_route_surfaces_configuration_errors() {
        let app = Application::from_config(&GantryConfig::default());
        let handler = RouteHandler::builder("broken", "/items")
            .owner(app.root())
            .param(Param::path("item_id", ParamType::Integer))
            .handler(page)
            .build()
            .unwrap();

        let err = app.route(handler).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Configuration(ConfigurationError::UnknownPathParameter { .. })
        ));
        assert!(app.handler_names().is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_handlers() {
        let app = Application::from_config(&GantryConfig::default());
        let build = || {
            RouteHandler::builder("page", "/")
                .owner(app.root())
                .handler(page)
                .build()
                .unwrap()
        };
        app.route(build()).unwrap();
        assert!(matches!(app.route(build()), Err(RuntimeError::HandlerExists(_))));

        let err = tokio_test::block_on(app.handle("missing", get("/"))).unwrap_err();
        assert!(matches!(err, RuntimeError::HandlerNotFound(name) if name == "missing"));
        assert!(app.service("missing").is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_default_body() {
        let app = Application::from_config(&GantryConfig::default());
        let handler = RouteHandler::builder("page", "/items")
            .owner(app.root())
            .param(Param::query("page", ParamType::Integer))
            .handler(page)
            .build()
            .unwrap();
        app.route(handler).unwrap();

        let request = Request::builder(Method::GET, "/items")
            .query("page", "two")
            .build()
            .into_connection();
        let response = app.handle("page", request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.json().unwrap();
        assert_eq!(body["status_code"], 400);
        assert_eq!(body["errors"][0]["field"], "page");
        assert_eq!(body["errors"][0]["location"], "query");
    }

    #[tokio::test]
    async fn test_permission_denied_default_body() {
        let app = Application::from_config(&GantryConfig::default());
        let handler = RouteHandler::builder("page", "/items")
            .owner(app.root())
            .permission(PermissionClass::of(|| DenyAll))
            .handler(page)
            .build()
            .unwrap();
        app.route(handler).unwrap();

        let response = app.handle("page", get("/items")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.json().unwrap()["detail"],
            "You do not have permission to perform this action."
        );
    }

    #[tokio::test]
    async fn test_exception_handler_maps_handler_error() {
        let root = root_layer(&GantryConfig::default())
            .exception_handler(ExceptionKey::error::<OutOfStock>(), |_, err| {
                let mut response = NativeResponse::empty(StatusCode::CONFLICT);
                let _ = response.insert_header("x-error", &err.exception().to_string());
                response
            })
            .build();
        let app = Application::new(root);
        app.route(
            RouteHandler::builder("buy", "/buy")
                .owner(app.root())
                .method(Method::POST)
                .handler(fail)
                .build()
                .unwrap(),
        )
        .unwrap();

        let response = app.handle("buy", get("/buy")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.header("x-error"), Some("out of stock"));
    }

    #[tokio::test]
    async fn test_unmapped_failure_hides_details_unless_debug() {
        for debug in [false, true] {
            let app = Application::from_config(&GantryConfig::default()).debug(debug);
            let handler = RouteHandler::builder("buy", "/buy")
                .owner(app.root())
                .handler(fail)
                .build()
                .unwrap();
            app.route(handler).unwrap();

            let response = app.handle("buy", get("/buy")).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let detail = response.json().unwrap()["detail"].clone();
            if debug {
                assert_eq!(detail, "handler failed: out of stock");
            } else {
                assert_eq!(detail, "Internal Server Error");
            }
        }
    }

    #[tokio::test]
    async fn test_service_for_registered_handler() {
        let app = Application::from_config(&GantryConfig::default());
        let handler = RouteHandler::builder("page", "/items")
            .owner(app.root())
            .param(Param::query("page", ParamType::Integer))
            .handler(page)
            .build()
            .unwrap();
        app.route(handler).unwrap();

        let request = Request::builder(Method::GET, "/items")
            .query("page", "3")
            .build()
            .into_connection();
        let response = app.service("page").unwrap().oneshot(request).await.unwrap();
        assert_eq!(response.json().unwrap(), json!({"page": 3}));
    }
}
