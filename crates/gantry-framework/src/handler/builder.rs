use std::collections::BTreeSet;
use std::sync::Arc;

use http::{Method, StatusCode};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::trace;

use gantry_core::{
    BackgroundTasks, Connection, Cookie, MediaType, NativeResponse, ResponseClass, ResponseHeader,
};

use super::RouteHandler;
use super::traits::{Handler, HandlerFn, SyncHandler};
use crate::error::{ConfigurationError, DispatchError};
use crate::exception::ExceptionKey;
use crate::inject::Inject;
use crate::layer::{Layer, LayerSettings};
use crate::permission::PermissionClass;
use crate::response::ReturnKind;
use crate::signature::Param;

static PATH_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)(?::[a-zA-Z_][a-zA-Z0-9_]*)?\}")
        .expect("Invalid path parameter regex")
});

/// Extracts the placeholder names of a path pattern such as
/// `/users/{user_id:int}/posts/{slug}`.
pub fn parse_path_parameters(path: &str) -> BTreeSet<String> {
    PATH_PARAM
        .captures_iter(path)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Builder for [`RouteHandler`].
///
/// # Example
///
/// ```rust,ignore
/// let handler = RouteHandler::builder("create_user", "/users")
///     .method(Method::POST)
///     .owner(&api)
///     .param(Param::body("data"))
///     .param(Param::dependency("db"))
///     .handler(create_user)
///     .build()?;
/// ```
pub struct RouteHandlerBuilder {
    name: String,
    path: String,
    methods: Vec<Method>,
    func: Option<(HandlerFn, ReturnKind)>,
    return_kind: Option<ReturnKind>,
    params: Vec<Param>,
    media_type: Option<MediaType>,
    status_code: Option<StatusCode>,
    background: Option<BackgroundTasks>,
    settings: LayerSettings,
    owner: Option<Arc<Layer>>,
}

impl RouteHandlerBuilder {
    pub(super) fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            methods: Vec::new(),
            func: None,
            return_kind: None,
            params: Vec::new(),
            media_type: None,
            status_code: None,
            background: None,
            settings: LayerSettings::default(),
            owner: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Uses an async function as the handler.
    pub fn handler<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T>,
    {
        self.func = Some((handler.into_handler_fn(), H::RETURN_KIND));
        self
    }

    /// Uses a synchronous function as the handler.
    pub fn sync_handler<H, T>(mut self, handler: H) -> Self
    where
        H: SyncHandler<T>,
    {
        self.func = Some((handler.into_handler_fn(), H::RETURN_KIND));
        self
    }

    /// Overrides the return declaration derived from the handler's type.
    pub fn return_kind(mut self, kind: ReturnKind) -> Self {
        self.return_kind = Some(kind);
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn media_type(mut self, media_type: impl Into<MediaType>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn background(mut self, background: BackgroundTasks) -> Self {
        self.background = Some(background);
        self
    }

    /// The layer owning the handler.
    pub fn owner(mut self, owner: &Arc<Layer>) -> Self {
        self.owner = Some(Arc::clone(owner));
        self
    }

    pub fn dependency(mut self, key: impl Into<String>, inject: Inject) -> Self {
        self.settings.add_dependency(key, inject);
        self
    }

    pub fn permission(mut self, permission: PermissionClass) -> Self {
        self.settings.add_permission(permission);
        self
    }

    pub fn exception_handler<F>(mut self, key: impl Into<ExceptionKey>, handler: F) -> Self
    where
        F: Fn(&dyn Connection, &DispatchError) -> NativeResponse + Send + Sync + 'static,
    {
        self.settings.add_exception_handler(key, handler);
        self
    }

    pub fn response_header(
        mut self,
        name: impl Into<String>,
        header: impl Into<ResponseHeader>,
    ) -> Self {
        self.settings.add_response_header(name, header.into());
        self
    }

    pub fn response_cookie(mut self, cookie: Cookie) -> Self {
        self.settings.add_response_cookie(cookie);
        self
    }

    pub fn response_class(mut self, class: impl ResponseClass) -> Self {
        self.settings.set_response_class(class);
        self
    }

    /// Builds the handler.
    ///
    /// Fails when no handler function was given or when a controller in the
    /// ownership chain does not allow one of the handler's methods.
    pub fn build(self) -> Result<Arc<RouteHandler>, ConfigurationError> {
        let (func, derived_kind) = self.func.ok_or_else(|| ConfigurationError::MissingHandler {
            name: self.name.clone(),
        })?;

        let mut methods = self.methods;
        if methods.is_empty() {
            methods.push(Method::GET);
        }

        let mut layer = self.owner.as_deref();
        while let Some(current) = layer {
            if let Some(allowed) = current.allowed_methods() {
                if let Some(method) = methods.iter().find(|m| !allowed.contains(m)) {
                    return Err(ConfigurationError::MethodNotAllowed {
                        handler: self.name,
                        method: method.to_string(),
                        allowed: allowed
                            .iter()
                            .map(Method::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
            layer = current.parent().map(Arc::as_ref);
        }

        let path_parameters = parse_path_parameters(&self.path);
        trace!(handler = %self.name, path = %self.path, ?path_parameters, "Built route handler");

        Ok(Arc::new(RouteHandler {
            name: self.name,
            path: self.path,
            path_parameters,
            methods,
            func,
            params: self.params,
            return_kind: self.return_kind.unwrap_or(derived_kind),
            media_type: self.media_type,
            status_code: self.status_code,
            background: self.background,
            settings: self.settings,
            owner: self.owner,
            signature_model: OnceCell::new(),
            kwargs_model: OnceCell::new(),
            dependencies: OnceCell::new(),
            permissions: OnceCell::new(),
            exception_handlers: OnceCell::new(),
            response_handler: OnceCell::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tower::BoxError;

    async fn noop() -> Result<Value, BoxError> {
        Ok(Value::Null)
    }

    #[test]
    fn test_parse_path_parameters() {
        let names = parse_path_parameters("/users/{user_id:int}/posts/{slug}");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["slug".to_string(), "user_id".to_string()]
        );
        assert!(parse_path_parameters("/static/path").is_empty());
    }

    #[test]
    fn test_missing_handler_function() {
        let err = RouteHandler::builder("orphan", "/").build().unwrap_err();
        assert_eq!(err, ConfigurationError::MissingHandler { name: "orphan".into() });
    }

    #[test]
    fn test_controller_restricts_methods() {
        let deletes = Layer::controller("deletes", ())
            .allowed_methods([Method::DELETE])
            .build();

        let ok = RouteHandler::builder("remove", "/{id}")
            .owner(&deletes)
            .method(Method::DELETE)
            .handler(noop)
            .build()
            .unwrap();
        assert!(ok.path_parameters().contains("id"));

        let err = RouteHandler::builder("read", "/{id}")
            .owner(&deletes)
            .handler(noop)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MethodNotAllowed { method, .. } if method == "GET"
        ));
    }

    #[test]
    fn test_return_kind_override() {
        let handler = RouteHandler::builder("dynamic", "/")
            .handler(noop)
            .return_kind(ReturnKind::Container)
            .build()
            .unwrap();
        assert_eq!(handler.return_kind(), ReturnKind::Container);
    }
}
