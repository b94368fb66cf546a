//! tower integration.
//!
//! [`HandlerService`] wraps one [`RouteHandler`] and implements
//! `tower::Service<Arc<dyn Connection>>`, so timeouts, concurrency limits and
//! other cross-cutting concerns can be stacked on top as ordinary tower
//! layers.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::Service;

use gantry_core::{Connection, NativeResponse, State};

use super::RouteHandler;
use crate::error::DispatchError;

/// A tower [`Service`] dispatching connections to a single handler.
#[derive(Debug, Clone)]
pub struct HandlerService {
    handler: Arc<RouteHandler>,
    app: State,
}

impl HandlerService {
    pub fn new(handler: Arc<RouteHandler>, app: State) -> Self {
        Self { handler, app }
    }

    pub fn handler(&self) -> &Arc<RouteHandler> {
        &self.handler
    }
}

impl Service<Arc<dyn Connection>> for HandlerService {
    type Response = NativeResponse;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<NativeResponse, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, connection: Arc<dyn Connection>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let app = self.app.clone();
        async move { handler.get_response_for_request(connection, &app).await }.boxed()
    }
}
