//! The connection abstraction consumed by the dispatch pipeline.
//!
//! A [`Connection`] is whatever the transport hands over once routing has
//! matched a handler: the path parameters are already extracted, headers and
//! cookies are already parsed, and the body is available through an
//! asynchronous read.
//!
//! [`Request`] is an in-memory implementation used by the runtime and by
//! tests.
//!
//! # Example
//!
//! ```rust,ignore
//! let request = Request::builder(Method::GET, "/users/7")
//!     .path_param("id", "7")
//!     .query("verbose", "true")
//!     .build();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionError, ConnectionResult};

// =============================================================================
// Connection
// =============================================================================

/// A live inbound connection, as seen by a handler.
pub trait Connection: Send + Sync + 'static {
    fn method(&self) -> &Method;

    fn path(&self) -> &str;

    /// Path parameters already matched by the router.
    fn path_params(&self) -> &HashMap<String, String>;

    /// Query parameters in wire order. A name may appear more than once.
    fn query_params(&self) -> &[(String, String)];

    fn headers(&self) -> &HeaderMap;

    fn cookies(&self) -> &HashMap<String, String>;

    /// Reads the request body.
    fn body(&self) -> BoxFuture<'_, ConnectionResult<Bytes>>;

    /// A token cancelled when the peer goes away mid-dispatch.
    fn cancellation(&self) -> Option<&CancellationToken> {
        None
    }

    /// Returns every value of a query parameter, in wire order.
    fn query_values(&self, name: &str) -> Vec<&str> {
        self.query_params()
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Returns a header as a string, if present and visible ASCII.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

// =============================================================================
// Request
// =============================================================================

/// An in-memory [`Connection`].
pub struct Request {
    method: Method,
    path: String,
    path_params: HashMap<String, String>,
    query_params: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Option<Bytes>,
    body_reads: AtomicUsize,
    cancellation: Option<CancellationToken>,
}

impl Request {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// Number of times the body has been read.
    pub fn body_read_count(&self) -> usize {
        self.body_reads.load(Ordering::SeqCst)
    }

    pub fn into_connection(self) -> Arc<dyn Connection> {
        Arc::new(self)
    }
}

impl Connection for Request {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    fn body(&self) -> BoxFuture<'_, ConnectionResult<Bytes>> {
        self.body_reads.fetch_add(1, Ordering::SeqCst);
        let body = self.body.clone();
        async move { body.ok_or(ConnectionError::Closed) }.boxed()
    }

    fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("path_params", &self.path_params)
            .field("query_params", &self.query_params)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RequestBuilder
// =============================================================================

/// Builder for [`Request`].
///
/// Invalid header names or values are skipped; this builder is meant for
/// tests and adapters that already hold validated data.
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request {
                method,
                path: path.into(),
                path_params: HashMap::new(),
                query_params: Vec::new(),
                headers: HeaderMap::new(),
                cookies: HashMap::new(),
                body: Some(Bytes::new()),
                body_reads: AtomicUsize::new(0),
                cancellation: None,
            },
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query_params.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.request.headers.append(name, value);
        }
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.cookies.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets the content type.
    pub fn json(self, value: &serde_json::Value) -> Self {
        let body = value.to_string();
        self.header("content-type", "application/json").body(body)
    }

    /// Makes every body read fail as if the peer had disconnected.
    pub fn closed(mut self) -> Self {
        self.request.body = None;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.request.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}
