//! Response containers.
//!
//! A container is a value that knows how to build its own wire response. The
//! coercion engine hands it the merged headers, the configured media type and
//! status, and the application [`State`], and takes whatever it produces.

use http::StatusCode;
use http::header::LOCATION;
use serde_json::Value;

use crate::background::BackgroundTasks;
use crate::cookie::Cookie;
use crate::error::ResponseResult;
use crate::header::HeaderValues;
use crate::media::MediaType;
use crate::response::NativeResponse;
use crate::state::State;

/// A self-rendering response description.
pub trait ResponseContainer: Send + Sync + 'static {
    /// Container-level headers. They override handler-level headers.
    fn headers(&self) -> &HeaderValues;

    /// Container-level cookies. They win over handler cookies with the same key.
    fn cookies(&self) -> &[Cookie];

    fn background(&self) -> Option<&BackgroundTasks> {
        None
    }

    /// Builds the wire response.
    fn to_response(
        self: Box<Self>,
        headers: HeaderValues,
        media_type: &MediaType,
        status_code: StatusCode,
        app: &State,
    ) -> ResponseResult<NativeResponse>;
}

impl std::fmt::Debug for dyn ResponseContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseContainer")
            .field("headers", self.headers())
            .field("cookies", &self.cookies())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Redirect
// =============================================================================

/// Redirects the client to another location.
///
/// The status is `307 Temporary Redirect` unless set explicitly; the
/// handler's configured status is ignored.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub path: String,
    pub status_code: StatusCode,
    pub headers: HeaderValues,
    pub cookies: Vec<Cookie>,
    pub background: Option<BackgroundTasks>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status_code: StatusCode::TEMPORARY_REDIRECT,
            headers: HeaderValues::new(),
            cookies: Vec::new(),
            background: None,
        }
    }

    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status_code = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }
}

impl ResponseContainer for Redirect {
    fn headers(&self) -> &HeaderValues {
        &self.headers
    }

    fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    fn background(&self) -> Option<&BackgroundTasks> {
        self.background.as_ref()
    }

    fn to_response(
        self: Box<Self>,
        mut headers: HeaderValues,
        _media_type: &MediaType,
        _status_code: StatusCode,
        _app: &State,
    ) -> ResponseResult<NativeResponse> {
        headers.insert(LOCATION.to_string(), self.path);
        NativeResponse::new(
            Vec::new(),
            self.status_code,
            &headers,
            None,
            self.background,
        )
    }
}

// =============================================================================
// JsonContainer
// =============================================================================

/// A JSON document rendered through the container path.
///
/// Uses the handler's configured status and media type.
#[derive(Debug, Clone, Default)]
pub struct JsonContainer {
    pub content: Value,
    pub headers: HeaderValues,
    pub cookies: Vec<Cookie>,
    pub background: Option<BackgroundTasks>,
}

impl JsonContainer {
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn background(mut self, background: BackgroundTasks) -> Self {
        self.background = Some(background);
        self
    }
}

impl ResponseContainer for JsonContainer {
    fn headers(&self) -> &HeaderValues {
        &self.headers
    }

    fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    fn background(&self) -> Option<&BackgroundTasks> {
        self.background.as_ref()
    }

    fn to_response(
        self: Box<Self>,
        headers: HeaderValues,
        media_type: &MediaType,
        status_code: StatusCode,
        _app: &State,
    ) -> ResponseResult<NativeResponse> {
        let body = serde_json::to_vec(&self.content)?;
        NativeResponse::new(
            body,
            status_code,
            &headers,
            Some(media_type.clone()),
            self.background,
        )
    }
}
