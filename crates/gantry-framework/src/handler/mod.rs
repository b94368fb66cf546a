//! Route handlers.
//!
//! A [`RouteHandler`] is the leaf of an ownership chain. Every setting it
//! inherits is merged across the chain once and cached for the handler's
//! lifetime:
//!
//! | Setting            | Merge order    | Conflict rule                          |
//! |--------------------|----------------|----------------------------------------|
//! | dependencies       | root → handler | inner key wins; one provider, one key  |
//! | permissions        | root → handler | concatenated                           |
//! | exception handlers | root → handler | inner key wins                         |
//! | response headers   | root → handler | inner name wins                        |
//! | response cookies   | handler → root | first key wins                         |
//! | response class     | handler → root | closest wins                           |
//!
//! Each cache is a [`OnceCell`], so concurrent first accesses build at most
//! one value and every caller sees the same instance.

mod builder;
mod dispatch;
mod service;
mod traits;

pub use builder::{RouteHandlerBuilder, parse_path_parameters};
pub use service::HandlerService;
pub use traits::{Arguments, Body, FromArguments, Handler, HandlerFn, Owner, SyncHandler};

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use gantry_core::{
    BackgroundTasks, Connection, Cookie, DefaultResponseClass, MediaType, ResponseClass,
    ResponseHeaders,
};

use crate::error::{ConfigurationError, PermissionDenied};
use crate::exception::ExceptionHandlers;
use crate::inject::Dependencies;
use crate::kwargs::KwargsModel;
use crate::layer::{Layer, LayerKind, LayerSettings, OwnershipLayer};
use crate::permission::PermissionClass;
use crate::response::{ResponseHandler, ReturnKind, get_headers};
use crate::signature::{Param, SignatureModel};

/// A handler function together with its route configuration.
pub struct RouteHandler {
    name: String,
    path: String,
    path_parameters: BTreeSet<String>,
    methods: Vec<Method>,
    func: HandlerFn,
    params: Vec<Param>,
    return_kind: ReturnKind,
    media_type: Option<MediaType>,
    status_code: Option<StatusCode>,
    background: Option<BackgroundTasks>,
    settings: LayerSettings,
    owner: Option<Arc<Layer>>,

    signature_model: OnceCell<Arc<SignatureModel>>,
    kwargs_model: OnceCell<Arc<KwargsModel>>,
    dependencies: OnceCell<Arc<Dependencies>>,
    permissions: OnceCell<Arc<[PermissionClass]>>,
    exception_handlers: OnceCell<Arc<ExceptionHandlers>>,
    response_handler: OnceCell<Arc<ResponseHandler>>,
}

impl RouteHandler {
    pub fn builder(name: impl Into<String>, path: impl Into<String>) -> RouteHandlerBuilder {
        RouteHandlerBuilder::new(name, path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Placeholder names of the path pattern.
    pub fn path_parameters(&self) -> &BTreeSet<String> {
        &self.path_parameters
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }

    pub fn is_async(&self) -> bool {
        self.func.is_async()
    }

    /// The layer directly owning this handler.
    pub fn owner(&self) -> Option<&Arc<Layer>> {
        self.owner.as_ref()
    }

    /// The controller instance handed to the handler as its first argument.
    pub fn owner_instance(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.owner
            .as_ref()
            .filter(|layer| layer.kind() == LayerKind::Controller)
            .and_then(|layer| layer.instance().cloned())
    }

    /// Every layer from the application root down to this handler.
    pub fn ownership_layers(&self) -> Vec<&dyn OwnershipLayer> {
        let mut layers: Vec<&dyn OwnershipLayer> = vec![self];
        let mut current = self.owner.as_deref();
        while let Some(layer) = current {
            layers.push(layer);
            current = layer.parent().map(Arc::as_ref);
        }
        layers.reverse();
        layers
    }

    /// Every dependency key visible to this handler.
    pub fn dependency_names(&self) -> BTreeSet<String> {
        self.ownership_layers()
            .into_iter()
            .filter_map(|layer| layer.dependencies())
            .flat_map(|deps| deps.keys().map(str::to_string))
            .collect()
    }

    // =========================================================================
    // Signature and kwargs models
    // =========================================================================

    /// Builds the signature model, once.
    pub fn create_signature_model(&self) -> Result<Arc<SignatureModel>, ConfigurationError> {
        self.signature_model
            .get_or_try_init(|| {
                debug!(handler = %self.name, "Building signature model");
                let names = self.dependency_names();
                SignatureModel::create(&self.name, &self.params, &names).map(Arc::new)
            })
            .cloned()
    }

    /// The signature model, if it was built already.
    pub fn signature_model(&self) -> Option<&Arc<SignatureModel>> {
        self.signature_model.get()
    }

    /// Builds the kwargs model, once, building the signature model first.
    pub fn kwargs_model(&self) -> Result<Arc<KwargsModel>, ConfigurationError> {
        self.kwargs_model
            .get_or_try_init(|| {
                let signature_model = self.create_signature_model()?;
                let dependencies = self.get_dependencies()?;
                KwargsModel::create_for_signature_model(
                    &signature_model,
                    &dependencies,
                    &self.path_parameters,
                )
                .map(Arc::new)
            })
            .cloned()
    }

    // =========================================================================
    // Layered settings
    // =========================================================================

    /// The dependencies of every layer, merged root to handler.
    ///
    /// A closer layer silently replaces an outer provider under the same key.
    /// Binding one provider under two different keys is an error. Requires
    /// the signature model to be built.
    pub fn get_dependencies(&self) -> Result<Arc<Dependencies>, ConfigurationError> {
        if self.signature_model.get().is_none() {
            return Err(ConfigurationError::SignatureModelMissing {
                handler: self.name.clone(),
            });
        }

        self.dependencies
            .get_or_try_init(|| {
                let mut merged = Dependencies::new();
                for layer in self.ownership_layers() {
                    let Some(dependencies) = layer.dependencies() else {
                        continue;
                    };
                    for (key, inject) in dependencies.iter() {
                        if let Some(existing) = merged.key_of(inject) {
                            if existing != key {
                                return Err(ConfigurationError::DuplicateInjector {
                                    key: key.to_string(),
                                    existing: existing.to_string(),
                                });
                            }
                        }
                        merged.insert(key, inject.clone());
                    }
                }
                debug!(handler = %self.name, count = merged.len(), "Merged dependencies");
                Ok(Arc::new(merged))
            })
            .cloned()
    }

    /// Permissions of every layer, root first, in declaration order.
    pub fn resolve_permissions(&self) -> Arc<[PermissionClass]> {
        self.permissions
            .get_or_init(|| {
                let permissions: Vec<PermissionClass> = self
                    .ownership_layers()
                    .into_iter()
                    .filter_map(|layer| layer.permissions())
                    .flatten()
                    .cloned()
                    .map(PermissionClass::into_async)
                    .collect();
                trace!(handler = %self.name, count = permissions.len(), "Resolved permissions");
                permissions.into()
            })
            .clone()
    }

    /// Runs every permission in order, stopping at the first denial.
    pub async fn allow_connection(
        &self,
        connection: &dyn Connection,
    ) -> Result<(), PermissionDenied> {
        for class in self.resolve_permissions().iter() {
            let permission = class.instantiate().await;
            let allowed = permission.has_permission(connection, self).await;
            if let Err(denied) = permission.continue_or_raise(allowed) {
                warn!(
                    handler = %self.name,
                    permission = %denied.permission,
                    path = %connection.path(),
                    "Permission denied"
                );
                return Err(denied);
            }
        }
        Ok(())
    }

    /// Exception handlers of every layer, merged root to handler.
    pub fn get_exception_handlers(&self) -> Arc<ExceptionHandlers> {
        self.exception_handlers
            .get_or_init(|| {
                let mut merged = ExceptionHandlers::new();
                for handlers in self
                    .ownership_layers()
                    .into_iter()
                    .filter_map(|layer| layer.exception_handlers())
                {
                    merged.extend(handlers);
                }
                Arc::new(merged)
            })
            .clone()
    }

    /// Response headers of every layer, merged root to handler.
    pub fn get_response_headers(&self) -> ResponseHeaders {
        let mut merged = ResponseHeaders::new();
        for headers in self
            .ownership_layers()
            .into_iter()
            .filter_map(|layer| layer.response_headers())
        {
            merged.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Response cookies of every layer; the closest cookie for a key wins.
    pub fn get_response_cookies(&self) -> Vec<Cookie> {
        let mut cookies: Vec<Cookie> = Vec::new();
        for layer in self.ownership_layers().into_iter().rev() {
            for cookie in layer.response_cookies().unwrap_or_default() {
                if !cookies.iter().any(|c| c.key == cookie.key) {
                    cookies.push(cookie.clone());
                }
            }
        }
        cookies
    }

    /// The closest configured response class.
    pub fn get_response_class(&self) -> Arc<dyn ResponseClass> {
        self.ownership_layers()
            .into_iter()
            .rev()
            .find_map(|layer| layer.response_class().cloned())
            .unwrap_or_else(|| Arc::new(DefaultResponseClass))
    }

    /// Value of the `allow` header: the handler's methods, sorted.
    pub fn allow_header(&self) -> String {
        let mut methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        methods.sort_unstable();
        methods.dedup();
        methods.join(", ")
    }

    /// The configured status, or the default for the handler's method.
    pub fn status_code(&self) -> StatusCode {
        self.status_code.unwrap_or_else(|| match self.methods.first() {
            Some(method) if *method == Method::POST => StatusCode::CREATED,
            Some(method) if *method == Method::DELETE => StatusCode::NO_CONTENT,
            _ => StatusCode::OK,
        })
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type.clone().unwrap_or_default()
    }

    /// Builds the response handler, once.
    pub fn get_response_handler(&self) -> Arc<ResponseHandler> {
        self.response_handler
            .get_or_init(|| {
                let mut builder = ResponseHandler::builder(self.return_kind)
                    .default_status(self.status_code())
                    .headers(get_headers(&self.get_response_headers()))
                    .cookies(self.get_response_cookies())
                    .allow(self.allow_header())
                    .response_class(self.get_response_class())
                    .background(self.background.clone());
                if let Some(status) = self.status_code {
                    builder = builder.status_code(status);
                }
                if let Some(media_type) = &self.media_type {
                    builder = builder.media_type(media_type.clone());
                }
                debug!(handler = %self.name, kind = %self.return_kind, "Built response handler");
                Arc::new(builder.build())
            })
            .clone()
    }
}

impl OwnershipLayer for RouteHandler {
    fn layer_name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &LayerSettings {
        &self.settings
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("return_kind", &self.return_kind)
            .field("owner", &self.owner.as_ref().map(|layer| layer.name()))
            .finish_non_exhaustive()
    }
}
