//! Ownership layers.
//!
//! Every handler sits at the bottom of a chain of layers:
//!
//! ```text
//! Application ──▶ Group ──▶ ... ──▶ Controller ──▶ RouteHandler
//!   (root)                                          (leaf)
//! ```
//!
//! Each layer may declare dependencies, permissions, exception handlers,
//! response headers, response cookies and a response class. The handler
//! merges these across its chain; see [`RouteHandler`](crate::RouteHandler)
//! for the per-setting override rules.
//!
//! Layers are immutable once built and shared through [`Arc`]. A child holds
//! its parent, never the other way around, so the chain always ends at a root
//! without a parent.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use http::Method;

use gantry_core::{Cookie, ResponseClass, ResponseHeader, ResponseHeaders};

use crate::error::DispatchError;
use crate::exception::{ExceptionHandlers, ExceptionKey};
use crate::inject::{Dependencies, Inject};
use crate::permission::PermissionClass;

// =============================================================================
// LayerSettings
// =============================================================================

/// The settings any ownership layer may declare. Unset means "inherit".
#[derive(Clone, Default)]
pub struct LayerSettings {
    pub dependencies: Option<Dependencies>,
    pub permissions: Option<Vec<PermissionClass>>,
    pub exception_handlers: Option<ExceptionHandlers>,
    pub response_headers: Option<ResponseHeaders>,
    pub response_cookies: Option<Vec<Cookie>>,
    pub response_class: Option<Arc<dyn ResponseClass>>,
}

impl LayerSettings {
    pub fn add_dependency(&mut self, key: impl Into<String>, inject: Inject) {
        self.dependencies
            .get_or_insert_with(Dependencies::new)
            .insert(key, inject);
    }

    pub fn add_permission(&mut self, permission: PermissionClass) {
        self.permissions.get_or_insert_with(Vec::new).push(permission);
    }

    pub fn add_exception_handler<F>(&mut self, key: impl Into<ExceptionKey>, handler: F)
    where
        F: Fn(&dyn gantry_core::Connection, &DispatchError) -> gantry_core::NativeResponse
            + Send
            + Sync
            + 'static,
    {
        self.exception_handlers
            .get_or_insert_with(ExceptionHandlers::new)
            .insert(key, handler);
    }

    pub fn add_response_header(&mut self, name: impl Into<String>, header: ResponseHeader) {
        self.response_headers
            .get_or_insert_with(ResponseHeaders::new)
            .insert(name.into(), header);
    }

    pub fn add_response_cookie(&mut self, cookie: Cookie) {
        self.response_cookies.get_or_insert_with(Vec::new).push(cookie);
    }

    pub fn set_response_class(&mut self, class: impl ResponseClass) {
        self.response_class = Some(Arc::new(class));
    }
}

impl fmt::Debug for LayerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerSettings")
            .field("dependencies", &self.dependencies)
            .field("permissions", &self.permissions)
            .field("exception_handlers", &self.exception_handlers)
            .field("response_headers", &self.response_headers)
            .field("response_cookies", &self.response_cookies)
            .field("response_class", &self.response_class.is_some())
            .finish()
    }
}

// =============================================================================
// OwnershipLayer
// =============================================================================

/// One level of the root-to-handler configuration chain.
pub trait OwnershipLayer: Send + Sync {
    fn layer_name(&self) -> &str;

    fn settings(&self) -> &LayerSettings;

    fn dependencies(&self) -> Option<&Dependencies> {
        self.settings().dependencies.as_ref()
    }

    fn permissions(&self) -> Option<&[PermissionClass]> {
        self.settings().permissions.as_deref()
    }

    fn exception_handlers(&self) -> Option<&ExceptionHandlers> {
        self.settings().exception_handlers.as_ref()
    }

    fn response_headers(&self) -> Option<&ResponseHeaders> {
        self.settings().response_headers.as_ref()
    }

    fn response_cookies(&self) -> Option<&[Cookie]> {
        self.settings().response_cookies.as_deref()
    }

    fn response_class(&self) -> Option<&Arc<dyn ResponseClass>> {
        self.settings().response_class.as_ref()
    }
}

// =============================================================================
// Layer
// =============================================================================

/// What a layer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Application,
    Group,
    /// A class-based view whose instance is handed to its handlers.
    Controller,
}

/// An application, group or controller layer.
pub struct Layer {
    name: String,
    kind: LayerKind,
    parent: Option<Arc<Layer>>,
    settings: LayerSettings,
    instance: Option<Arc<dyn Any + Send + Sync>>,
    allowed_methods: Option<Vec<Method>>,
}

impl Layer {
    pub fn application(name: impl Into<String>) -> LayerBuilder {
        LayerBuilder::new(name, LayerKind::Application)
    }

    pub fn group(name: impl Into<String>) -> LayerBuilder {
        LayerBuilder::new(name, LayerKind::Group)
    }

    /// A controller. Handlers owned by it receive `instance` as their owner.
    pub fn controller<T>(name: impl Into<String>, instance: T) -> LayerBuilder
    where
        T: Send + Sync + 'static,
    {
        let mut builder = LayerBuilder::new(name, LayerKind::Controller);
        builder.layer.instance = Some(Arc::new(instance));
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    /// The controller instance, if this layer is a controller.
    pub fn instance(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.instance.as_ref()
    }

    /// Methods handlers of this layer are restricted to, if any.
    pub fn allowed_methods(&self) -> Option<&[Method]> {
        self.allowed_methods.as_deref()
    }

    /// This layer and its ancestors, root first.
    pub fn chain(self: &Arc<Self>) -> Vec<Arc<Layer>> {
        let mut chain = vec![Arc::clone(self)];
        let mut current = self.parent.clone();
        while let Some(layer) = current {
            current = layer.parent.clone();
            chain.push(layer);
        }
        chain.reverse();
        chain
    }
}

impl OwnershipLayer for Layer {
    fn layer_name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &LayerSettings {
        &self.settings
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("allowed_methods", &self.allowed_methods)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// LayerBuilder
// =============================================================================

/// Builder for [`Layer`].
pub struct LayerBuilder {
    layer: Layer,
}

impl LayerBuilder {
    fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            layer: Layer {
                name: name.into(),
                kind,
                parent: None,
                settings: LayerSettings::default(),
                instance: None,
                allowed_methods: None,
            },
        }
    }

    pub fn parent(mut self, parent: &Arc<Layer>) -> Self {
        self.layer.parent = Some(Arc::clone(parent));
        self
    }

    pub fn dependency(mut self, key: impl Into<String>, inject: Inject) -> Self {
        self.layer.settings.add_dependency(key, inject);
        self
    }

    pub fn permission(mut self, permission: PermissionClass) -> Self {
        self.layer.settings.add_permission(permission);
        self
    }

    pub fn exception_handler<F>(mut self, key: impl Into<ExceptionKey>, handler: F) -> Self
    where
        F: Fn(&dyn gantry_core::Connection, &DispatchError) -> gantry_core::NativeResponse
            + Send
            + Sync
            + 'static,
    {
        self.layer.settings.add_exception_handler(key, handler);
        self
    }

    pub fn response_header(
        mut self,
        name: impl Into<String>,
        header: impl Into<ResponseHeader>,
    ) -> Self {
        self.layer.settings.add_response_header(name, header.into());
        self
    }

    pub fn response_cookie(mut self, cookie: Cookie) -> Self {
        self.layer.settings.add_response_cookie(cookie);
        self
    }

    pub fn response_class(mut self, class: impl ResponseClass) -> Self {
        self.layer.settings.set_response_class(class);
        self
    }

    /// Restricts the methods handlers of this layer may use.
    pub fn allowed_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.layer.allowed_methods = Some(methods.into_iter().collect());
        self
    }

    pub fn settings(mut self, settings: LayerSettings) -> Self {
        self.layer.settings = settings;
        self
    }

    pub fn build(self) -> Arc<Layer> {
        Arc::new(self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_runs_root_to_leaf() {
        let app = Layer::application("app").build();
        let api = Layer::group("api").parent(&app).build();
        let users = Layer::controller("users", ()).parent(&api).build();

        let names: Vec<_> = users.chain().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["app", "api", "users"]);
        assert!(app.parent().is_none());
        assert!(users.instance().is_some());
        assert_eq!(users.kind(), LayerKind::Controller);
    }

    #[test]
    fn test_unset_settings_are_none() {
        let layer = Layer::group("g")
            .dependency("db", Inject::value(1_u8))
            .response_header("x-app", "gantry")
            .build();

        assert_eq!(layer.dependencies().map(Dependencies::len), Some(1));
        assert_eq!(layer.response_headers().unwrap()["x-app"].value, "gantry");
        assert!(layer.permissions().is_none());
        assert!(layer.response_cookies().is_none());
        assert!(layer.response_class().is_none());
    }
}
