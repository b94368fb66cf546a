//! Response coercion.
//!
//! A [`ResponseHandler`] is built once per route handler and turns whatever
//! the handler returned into a [`NativeResponse`]. The strategy is chosen by
//! the handler's declared [`ReturnKind`], never by inspecting the value:
//!
//! | Kind             | Strategy                                                  |
//! |------------------|-----------------------------------------------------------|
//! | `Container`      | container renders itself with merged headers and cookies |
//! | `JsonResponse`   | passed through, status overridden when configured         |
//! | `Response`       | headers and cookies merged, status and media type applied |
//! | `NativeResponse` | headers and cookies merged, media type forced             |
//! | `Plain`          | awaited if deferred, then wrapped by the response class   |

mod merge;
mod returned;

pub use merge::{get_headers, merge_cookies, merge_headers};
pub use returned::{Json, Responder, ReturnKind, Returned};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use http::header::ALLOW;
use serde_json::Value;
use tracing::trace;

use gantry_core::{
    BackgroundTasks, Cookie, DefaultResponseClass, HeaderValues, JsonResponse, MediaType,
    NativeResponse, Response, ResponseClass, ResponseContainer, State,
};

use crate::error::DispatchError;

// =============================================================================
// ResponseHandler
// =============================================================================

/// Converts handler return values into wire responses.
#[derive(Clone)]
pub struct ResponseHandler {
    kind: ReturnKind,
    status_code: StatusCode,
    configured_status: Option<StatusCode>,
    media_type: MediaType,
    configured_media_type: Option<MediaType>,
    headers: HeaderValues,
    cookies: Vec<Cookie>,
    allow: Option<String>,
    response_class: Arc<dyn ResponseClass>,
    background: Option<BackgroundTasks>,
}

impl ResponseHandler {
    pub fn builder(kind: ReturnKind) -> ResponseHandlerBuilder {
        ResponseHandlerBuilder::new(kind)
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    /// The status used when the handler configured none.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Converts a returned value into a response.
    pub async fn handle(
        &self,
        returned: Returned,
        app: &State,
    ) -> Result<NativeResponse, DispatchError> {
        trace!(kind = %self.kind, got = %returned.kind(), "Coercing handler return value");
        match self.kind {
            ReturnKind::Container => match returned {
                Returned::Container(container) => self.container_response(container, app),
                other => Err(self.mismatch(&other)),
            },
            ReturnKind::JsonResponse => match returned {
                Returned::Json(response) => Ok(self.json_response(response)),
                other => Err(self.mismatch(&other)),
            },
            ReturnKind::Response => match returned {
                Returned::Response(response) => self.generic_response(response),
                other => Err(self.mismatch(&other)),
            },
            ReturnKind::NativeResponse => match returned {
                Returned::Native(response) => self.native_response(response),
                other => Err(self.mismatch(&other)),
            },
            ReturnKind::Plain => self.plain_response(returned, app).await,
        }
    }

    fn mismatch(&self, returned: &Returned) -> DispatchError {
        DispatchError::ReturnTypeMismatch {
            expected: self.kind,
            got: returned.kind(),
        }
    }

    fn container_response(
        &self,
        container: Box<dyn ResponseContainer>,
        app: &State,
    ) -> Result<NativeResponse, DispatchError> {
        let headers = merge_headers([&self.headers, container.headers()]);
        let cookies = merge_cookies(container.cookies(), &self.cookies);
        let mut response =
            container.to_response(headers, &self.media_type, self.status_code, app)?;
        for cookie in &cookies {
            response.set_cookie(cookie)?;
        }
        Ok(response)
    }

    fn json_response(&self, mut response: JsonResponse) -> NativeResponse {
        if let Some(status) = self.configured_status {
            response.set_status_code(status);
        }
        response.into_native()
    }

    fn generic_response(&self, mut response: Response) -> Result<NativeResponse, DispatchError> {
        response.cookies = merge_cookies(&response.cookies, &self.cookies);
        let allow = self.allow_header();
        response.headers = merge_headers([&self.headers, &response.headers, &allow]);
        if let Some(status) = self.configured_status {
            response.status_code = Some(status);
        }
        if let Some(media_type) = &self.configured_media_type {
            response.media_type = Some(media_type.clone());
        }
        Ok(response.into_native()?)
    }

    fn native_response(
        &self,
        mut response: NativeResponse,
    ) -> Result<NativeResponse, DispatchError> {
        let present: HashSet<String> = response
            .set_cookies()
            .iter()
            .filter_map(|line| line.split_once('=').map(|(key, _)| key.trim().to_string()))
            .collect();
        for cookie in &self.cookies {
            if !present.contains(&cookie.key) {
                response.set_cookie(cookie)?;
            }
        }

        for (name, value) in &self.headers {
            if !response.headers().contains_key(name.as_str()) {
                response.insert_header(name, value)?;
            }
        }
        if let Some(allow) = &self.allow {
            response.insert_header(ALLOW.as_str(), allow)?;
        }
        response.set_media_type(self.media_type.clone())?;
        Ok(response)
    }

    async fn plain_response(
        &self,
        mut returned: Returned,
        app: &State,
    ) -> Result<NativeResponse, DispatchError> {
        while let Returned::Deferred(fut) = returned {
            returned = fut.await.map_err(DispatchError::from_handler)?;
        }

        let content = match returned {
            Returned::Value(content) => content,
            Returned::Json(mut response) => {
                response.set_status_code(self.status_code);
                response.set_background(self.background.clone());
                return Ok(response.into_native());
            }
            Returned::Container(container) => return self.container_response(container, app),
            Returned::Response(response) => return self.generic_response(response),
            Returned::Native(response) => return self.native_response(response),
            Returned::Deferred(_) => Value::Null,
        };

        let allow = self.allow_header();
        let headers = merge_headers([&self.headers, &allow]);
        let mut response = self.response_class.build(
            content,
            self.status_code,
            &headers,
            &self.media_type,
            self.background.clone(),
        )?;
        for cookie in merge_cookies(&self.cookies, &[]) {
            response.set_cookie(&cookie)?;
        }
        Ok(response)
    }

    fn allow_header(&self) -> HeaderValues {
        self.allow
            .iter()
            .map(|allow| (ALLOW.to_string(), allow.clone()))
            .collect()
    }
}

impl fmt::Debug for ResponseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("kind", &self.kind)
            .field("status_code", &self.status_code)
            .field("media_type", &self.media_type)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.len())
            .field("allow", &self.allow)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ResponseHandlerBuilder
// =============================================================================

/// Builder for [`ResponseHandler`].
pub struct ResponseHandlerBuilder {
    handler: ResponseHandler,
}

impl ResponseHandlerBuilder {
    fn new(kind: ReturnKind) -> Self {
        Self {
            handler: ResponseHandler {
                kind,
                status_code: StatusCode::OK,
                configured_status: None,
                media_type: MediaType::Json,
                configured_media_type: None,
                headers: HeaderValues::new(),
                cookies: Vec::new(),
                allow: None,
                response_class: Arc::new(DefaultResponseClass),
                background: None,
            },
        }
    }

    /// Status applied when the handler configured none.
    pub fn default_status(mut self, status: StatusCode) -> Self {
        self.handler.status_code = status;
        self
    }

    /// An explicitly configured status, overriding pre-built responses.
    pub fn status_code(mut self, status: StatusCode) -> Self {
        self.handler.status_code = status;
        self.handler.configured_status = Some(status);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.handler.media_type = media_type.clone();
        self.handler.configured_media_type = Some(media_type);
        self
    }

    pub fn headers(mut self, headers: HeaderValues) -> Self {
        self.handler.headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.handler.cookies = cookies;
        self
    }

    /// Value of the `allow` header.
    pub fn allow(mut self, allow: impl Into<String>) -> Self {
        self.handler.allow = Some(allow.into());
        self
    }

    pub fn response_class(mut self, class: Arc<dyn ResponseClass>) -> Self {
        self.handler.response_class = class;
        self
    }

    pub fn background(mut self, background: Option<BackgroundTasks>) -> Self {
        self.handler.background = background;
        self
    }

    pub fn build(self) -> ResponseHandler {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{BackgroundTask, JsonContainer, JsonResponseClass, Redirect};
    use serde_json::json;
    use tower::BoxError;

    fn plain() -> ResponseHandlerBuilder {
        ResponseHandler::builder(ReturnKind::Plain)
    }

    #[tokio::test]
    async fn test_plain_dict_round_trips_with_status_and_media_type() {
        let handler = plain()
            .status_code(StatusCode::CREATED)
            .media_type(MediaType::Json)
            .build();

        let response = handler
            .handle(Returned::Value(json!({"id": 1, "name": "ada"})), &State::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.media_type(), Some(&MediaType::Json));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json().unwrap(), json!({"id": 1, "name": "ada"}));
    }

    #[tokio::test]
    async fn test_plain_value_gets_headers_cookies_and_allow() {
        let handler = plain()
            .headers(HeaderValues::from([("x-app".to_string(), "gantry".to_string())]))
            .cookies(vec![Cookie::new("a", "1").description("docs only")])
            .allow("GET, HEAD")
            .media_type(MediaType::Text)
            .build();

        let response = handler
            .handle(Returned::Value(json!("hello")), &State::new())
            .await
            .unwrap();

        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(response.header("x-app"), Some("gantry"));
        assert_eq!(response.header("allow"), Some("GET, HEAD"));
        assert_eq!(response.set_cookies(), vec!["a=1; Path=/; SameSite=lax"]);
    }

    #[tokio::test]
    async fn test_plain_awaits_deferred_and_reuses_json_response() {
        let handler = plain().default_status(StatusCode::ACCEPTED).build();
        let deferred = Returned::deferred(async {
            Ok::<_, BoxError>(JsonResponse::new(&json!([1])).unwrap())
        });

        let response = handler.handle(deferred, &State::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.json().unwrap(), json!([1]));
    }

    #[tokio::test]
    async fn test_plain_json_response_takes_handler_background() {
        let tasks = BackgroundTasks::single(BackgroundTask::new(|| async {}));
        let mut returned = JsonResponse::new(&json!({})).unwrap();
        returned.set_background(Some(tasks.clone()));

        let without = plain().build();
        let response = without
            .handle(Returned::Json(returned.clone()), &State::new())
            .await
            .unwrap();
        assert!(response.background().is_none());

        let with = plain()
            .background(Some(tasks.clone().add(BackgroundTask::new(|| async {}))))
            .build();
        let response = with.handle(Returned::Json(returned), &State::new()).await.unwrap();
        assert_eq!(response.background().map(BackgroundTasks::len), Some(2));
    }

    #[tokio::test]
    async fn test_plain_uses_configured_response_class() {
        let handler = plain()
            .media_type(MediaType::Text)
            .response_class(Arc::new(JsonResponseClass))
            .build();

        let response = handler
            .handle(Returned::Value(json!("hi")), &State::new())
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"\"hi\"");
        assert_eq!(response.media_type(), Some(&MediaType::Json));
    }

    #[tokio::test]
    async fn test_container_merges_headers_and_cookies() {
        let handler = ResponseHandler::builder(ReturnKind::Container)
            .status_code(StatusCode::CREATED)
            .headers(HeaderValues::from([
                ("x-a".to_string(), "handler".to_string()),
                ("x-b".to_string(), "handler".to_string()),
            ]))
            .cookies(vec![Cookie::new("a", "2"), Cookie::new("b", "3")])
            .build();
        let container = JsonContainer::new(json!({"ok": true}))
            .header("x-b", "container")
            .cookie(Cookie::new("a", "1"));

        let response = handler
            .handle(Returned::Container(Box::new(container)), &State::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.header("x-a"), Some("handler"));
        assert_eq!(response.header("x-b"), Some("container"));
        assert_eq!(
            response.set_cookies(),
            vec!["a=1; Path=/; SameSite=lax", "b=3; Path=/; SameSite=lax"]
        );
    }

    #[tokio::test]
    async fn test_container_kind_rejects_other_values() {
        let handler = ResponseHandler::builder(ReturnKind::Container).build();
        let err = handler
            .handle(Returned::Value(json!(1)), &State::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ReturnTypeMismatch {
                expected: ReturnKind::Container,
                got: ReturnKind::Plain,
            }
        ));

        let redirect = Returned::Container(Box::new(Redirect::to("/login")));
        let response = handler.handle(redirect, &State::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.header("location"), Some("/login"));
    }

    #[tokio::test]
    async fn test_json_response_status_only_overridden_when_configured() {
        let untouched = ResponseHandler::builder(ReturnKind::JsonResponse)
            .default_status(StatusCode::OK)
            .build();
        let json = JsonResponse::new(&json!({})).unwrap().with_status(StatusCode::ACCEPTED);
        let response = untouched.handle(Returned::Json(json.clone()), &State::new()).await;
        assert_eq!(response.unwrap().status(), StatusCode::ACCEPTED);

        let overridden = ResponseHandler::builder(ReturnKind::JsonResponse)
            .status_code(StatusCode::CREATED)
            .build();
        let response = overridden.handle(Returned::Json(json), &State::new()).await;
        assert_eq!(response.unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_generic_response_merges_and_overrides() {
        let handler = ResponseHandler::builder(ReturnKind::Response)
            .status_code(StatusCode::CREATED)
            .media_type(MediaType::Text)
            .headers(HeaderValues::from([("x-a".to_string(), "handler".to_string())]))
            .cookies(vec![Cookie::new("a", "2"), Cookie::new("b", "3")])
            .allow("POST")
            .build();
        let data = Response::new("done")
            .status_code(StatusCode::OK)
            .header("x-a", "data")
            .cookie(Cookie::new("a", "1"));

        let response = handler
            .handle(Returned::Response(data), &State::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.media_type(), Some(&MediaType::Text));
        assert_eq!(response.body().as_ref(), b"done");
        assert_eq!(response.header("x-a"), Some("data"));
        assert_eq!(response.header("allow"), Some("POST"));
        assert_eq!(response.set_cookies().len(), 2);
        assert!(response.set_cookies()[0].starts_with("a=1"));
    }

    #[tokio::test]
    async fn test_native_response_forces_media_type() {
        let handler = ResponseHandler::builder(ReturnKind::NativeResponse)
            .media_type(MediaType::Html)
            .headers(HeaderValues::from([
                ("x-a".to_string(), "handler".to_string()),
                ("x-b".to_string(), "handler".to_string()),
            ]))
            .cookies(vec![Cookie::new("a", "2"), Cookie::new("b", "3")])
            .build();

        let mut native = NativeResponse::new(
            "<p>hi</p>",
            StatusCode::OK,
            &HeaderValues::from([("x-b".to_string(), "native".to_string())]),
            Some(MediaType::Text),
            None,
        )
        .unwrap();
        native.set_cookie(&Cookie::new("a", "1")).unwrap();

        let response = handler
            .handle(Returned::Native(native), &State::new())
            .await
            .unwrap();

        assert_eq!(response.media_type(), Some(&MediaType::Html));
        assert_eq!(response.header("x-a"), Some("handler"));
        assert_eq!(response.header("x-b"), Some("native"));
        assert_eq!(
            response.set_cookies(),
            vec!["a=1; Path=/; SameSite=lax", "b=3; Path=/; SameSite=lax"]
        );
    }
}
