//! The response family.
//!
//! Three response shapes live here:
//!
//! - [`NativeResponse`] — the transport-native, wire-ready response. Every
//!   dispatch ends with one of these.
//! - [`Response`] — the framework's generic response: JSON content plus
//!   optional status, media type, headers, cookies and background work,
//!   rendered into a [`NativeResponse`] on demand.
//! - [`JsonResponse`] — a pre-built JSON response whose body is already
//!   serialized.
//!
//! [`ResponseClass`] is the constructor used when a handler returns a plain
//! value that has to be wrapped.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::background::BackgroundTasks;
use crate::cookie::Cookie;
use crate::error::{ResponseError, ResponseResult};
use crate::header::HeaderValues;
use crate::media::MediaType;

// =============================================================================
// NativeResponse
// =============================================================================

/// A wire-ready response.
///
/// The `content-type` header always mirrors [`media_type`](Self::media_type)
/// and `content-length` always mirrors the body.
#[derive(Debug, Clone)]
pub struct NativeResponse {
    status: StatusCode,
    media_type: Option<MediaType>,
    headers: HeaderMap,
    body: Bytes,
    background: Option<BackgroundTasks>,
}

impl NativeResponse {
    /// Builds a response from its parts.
    ///
    /// An explicit `content-type` in `headers` takes precedence over
    /// `media_type`.
    pub fn new(
        body: impl Into<Bytes>,
        status: StatusCode,
        headers: &HeaderValues,
        media_type: Option<MediaType>,
        background: Option<BackgroundTasks>,
    ) -> ResponseResult<Self> {
        let body = body.into();
        let mut response = Self {
            status,
            media_type: None,
            headers: HeaderMap::new(),
            body,
            background,
        };

        for (name, value) in headers {
            response.insert_header(name, value)?;
        }

        if let Some(media_type) = media_type {
            if response.headers.contains_key(CONTENT_TYPE) {
                response.media_type = Some(media_type);
            } else {
                response.set_media_type(media_type)?;
            }
        }

        response
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(response.body.len()));
        Ok(response)
    }

    /// An empty response with the given status.
    pub fn empty(status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0_usize));
        Self {
            status,
            media_type: None,
            headers,
            body: Bytes::new(),
            background: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn media_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    /// Sets the media type and rewrites the `content-type` header to match.
    pub fn set_media_type(&mut self, media_type: MediaType) -> ResponseResult<()> {
        let value = HeaderValue::from_str(&media_type.content_type()).map_err(|_| {
            ResponseError::InvalidHeaderValue {
                name: CONTENT_TYPE.to_string(),
            }
        })?;
        self.headers.insert(CONTENT_TYPE, value);
        self.media_type = Some(media_type);
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns a header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Inserts a header, replacing previous values with the same name.
    pub fn insert_header(&mut self, name: &str, value: &str) -> ResponseResult<()> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| ResponseError::InvalidHeaderName {
                name: name.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ResponseError::InvalidHeaderValue {
                name: name.to_string(),
            })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Appends a `Set-Cookie` header for the cookie.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> ResponseResult<()> {
        let value = HeaderValue::from_str(&cookie.to_header_value()).map_err(|_| {
            ResponseError::InvalidHeaderValue {
                name: SET_COOKIE.to_string(),
            }
        })?;
        self.headers.append(SET_COOKIE, value);
        Ok(())
    }

    /// Returns every `Set-Cookie` header value in insertion order.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> ResponseResult<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn background(&self) -> Option<&BackgroundTasks> {
        self.background.as_ref()
    }

    pub fn set_background(&mut self, background: Option<BackgroundTasks>) {
        self.background = background;
    }

    /// Detaches the background tasks so the transport can run them after
    /// sending the response.
    pub fn take_background(&mut self) -> Option<BackgroundTasks> {
        self.background.take()
    }
}

// =============================================================================
// Response
// =============================================================================

/// The framework's generic response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub content: Value,
    pub status_code: Option<StatusCode>,
    pub media_type: Option<MediaType>,
    pub headers: HeaderValues,
    pub cookies: Vec<Cookie>,
    pub background: Option<BackgroundTasks>,
}

impl Response {
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
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

    pub fn background(mut self, background: BackgroundTasks) -> Self {
        self.background = Some(background);
        self
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// Renders this response onto the wire.
    ///
    /// Status defaults to `200 OK` and media type to JSON.
    pub fn into_native(self) -> ResponseResult<NativeResponse> {
        let media_type = self.media_type.unwrap_or_default();
        let body = render_content(&self.content, &media_type)?;
        let mut response = NativeResponse::new(
            body,
            self.status_code.unwrap_or(StatusCode::OK),
            &self.headers,
            Some(media_type),
            self.background,
        )?;
        for cookie in &self.cookies {
            response.set_cookie(cookie)?;
        }
        Ok(response)
    }
}

/// Serializes content according to the media type.
///
/// JSON media types always serialize; other types send strings verbatim,
/// send nothing for `null`, and fall back to JSON for structured values.
pub fn render_content(content: &Value, media_type: &MediaType) -> ResponseResult<Bytes> {
    if media_type.is_json() {
        return Ok(Bytes::from(serde_json::to_vec(content)?));
    }
    match content {
        Value::Null => Ok(Bytes::new()),
        Value::String(text) => Ok(Bytes::from(text.clone())),
        other => Ok(Bytes::from(serde_json::to_vec(other)?)),
    }
}

// =============================================================================
// JsonResponse
// =============================================================================

/// A pre-built JSON response.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    inner: NativeResponse,
}

impl JsonResponse {
    /// Serializes `content` into a `200 OK` JSON response.
    pub fn new<T: Serialize + ?Sized>(content: &T) -> ResponseResult<Self> {
        let body = serde_json::to_vec(content)?;
        let inner = NativeResponse::new(
            body,
            StatusCode::OK,
            &HeaderValues::new(),
            Some(MediaType::Json),
            None,
        )?;
        Ok(Self { inner })
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.inner.set_status(status);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn set_status_code(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    pub fn set_background(&mut self, background: Option<BackgroundTasks>) {
        self.inner.set_background(background);
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    pub fn into_native(self) -> NativeResponse {
        self.inner
    }
}

impl From<JsonResponse> for NativeResponse {
    fn from(response: JsonResponse) -> Self {
        response.into_native()
    }
}

// =============================================================================
// ResponseClass
// =============================================================================

/// Constructs a wire response around a plain handler value.
pub trait ResponseClass: Send + Sync + 'static {
    fn build(
        &self,
        content: Value,
        status_code: StatusCode,
        headers: &HeaderValues,
        media_type: &MediaType,
        background: Option<BackgroundTasks>,
    ) -> ResponseResult<NativeResponse>;
}

/// The default response class: renders content according to the media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponseClass;

impl ResponseClass for DefaultResponseClass {
    fn build(
        &self,
        content: Value,
        status_code: StatusCode,
        headers: &HeaderValues,
        media_type: &MediaType,
        background: Option<BackgroundTasks>,
    ) -> ResponseResult<NativeResponse> {
        let body = render_content(&content, media_type)?;
        NativeResponse::new(
            body,
            status_code,
            headers,
            Some(media_type.clone()),
            background,
        )
    }
}

/// Always serializes content as JSON, whatever the configured media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseClass;

impl ResponseClass for JsonResponseClass {
    fn build(
        &self,
        content: Value,
        status_code: StatusCode,
        headers: &HeaderValues,
        _media_type: &MediaType,
        background: Option<BackgroundTasks>,
    ) -> ResponseResult<NativeResponse> {
        let body = serde_json::to_vec(&content)?;
        NativeResponse::new(body, status_code, headers, Some(MediaType::Json), background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_response_tracks_content_headers() {
        let mut response = NativeResponse::new(
            "hello",
            StatusCode::OK,
            &HeaderValues::new(),
            Some(MediaType::Text),
            None,
        )
        .unwrap();

        assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(response.header("content-length"), Some("5"));

        response.set_media_type(MediaType::Html).unwrap();
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_explicit_content_type_header_wins_on_construction() {
        let headers = HeaderValues::from([("content-type".to_string(), "text/csv".to_string())]);
        let response =
            NativeResponse::new("a,b", StatusCode::OK, &headers, Some(MediaType::Json), None)
                .unwrap();
        assert_eq!(response.header("content-type"), Some("text/csv"));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut response = NativeResponse::empty(StatusCode::OK);
        let err = response.insert_header("bad header", "x").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidHeaderName { .. }));
    }

    #[test]
    fn test_generic_response_renders_cookies_and_status() {
        let response = Response::new(json!({"ok": true}))
            .status_code(StatusCode::ACCEPTED)
            .header("x-trace", "abc")
            .cookie(Cookie::new("a", "1"))
            .into_native()
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.header("x-trace"), Some("abc"));
        assert_eq!(response.set_cookies(), vec!["a=1; Path=/; SameSite=lax"]);
        assert_eq!(response.json().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_text_content_is_sent_verbatim() {
        let body = render_content(&json!("plain"), &MediaType::Text).unwrap();
        assert_eq!(body, Bytes::from("plain"));
        let body = render_content(&Value::Null, &MediaType::Html).unwrap();
        assert!(body.is_empty());
        let body = render_content(&json!("quoted"), &MediaType::Json).unwrap();
        assert_eq!(body, Bytes::from("\"quoted\""));
    }

    #[test]
    fn test_json_response_class_ignores_media_type() {
        let response = JsonResponseClass
            .build(
                json!([1, 2]),
                StatusCode::OK,
                &HeaderValues::new(),
                &MediaType::Text,
                None,
            )
            .unwrap();
        assert_eq!(response.media_type(), Some(&MediaType::Json));
        assert_eq!(response.json().unwrap(), json!([1, 2]));
    }
}
