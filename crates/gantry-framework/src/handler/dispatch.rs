//! The dispatch path of a single connection.

use std::sync::Arc;

use tracing::{Instrument, Level, debug, span, trace};

use gantry_core::{Connection, NativeResponse, State};

use super::RouteHandler;
use super::traits::Arguments;
use crate::error::{ConfigurationError, DispatchError, DispatchResult};
use crate::kwargs::{Kwargs, KwargsModel};
use crate::response::Returned;

impl RouteHandler {
    /// Checks permissions and runs the handler for one connection.
    ///
    /// If the connection carries a cancellation token and it fires first,
    /// the in-flight dispatch is dropped and [`DispatchError::Cancelled`] is
    /// returned.
    pub async fn get_response_for_request(
        &self,
        connection: Arc<dyn Connection>,
        app: &State,
    ) -> DispatchResult<NativeResponse> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            handler = %self.name,
            method = %connection.method(),
            path = %connection.path()
        );

        let token = connection.cancellation().cloned();
        let dispatch = self.dispatch(connection, app).instrument(span);
        match token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(handler = %self.name, "Connection cancelled mid-dispatch");
                    Err(DispatchError::Cancelled)
                }
                result = dispatch => result,
            },
            None => dispatch.await,
        }
    }

    async fn dispatch(
        &self,
        connection: Arc<dyn Connection>,
        app: &State,
    ) -> DispatchResult<NativeResponse> {
        self.allow_connection(connection.as_ref()).await?;
        let parameter_model = self.kwargs_model()?;
        self.call_handler_function(connection, app, &parameter_model)
            .await
    }

    /// Resolves arguments, calls the handler and coerces its return value.
    pub async fn call_handler_function(
        &self,
        connection: Arc<dyn Connection>,
        app: &State,
        parameter_model: &KwargsModel,
    ) -> DispatchResult<NativeResponse> {
        let returned = self.get_response_data(connection, parameter_model).await?;
        let response_handler = self.get_response_handler();
        response_handler.handle(returned, app).await
    }

    async fn get_response_data(
        &self,
        connection: Arc<dyn Connection>,
        parameter_model: &KwargsModel,
    ) -> DispatchResult<Returned> {
        let kwargs = if parameter_model.has_kwargs() {
            let mut raw = parameter_model.to_kwargs(&connection);
            raw.resolve_body().await?;
            for dependency in parameter_model.expected_dependencies() {
                let value = parameter_model.resolve_dependency(dependency, &raw).await?;
                raw.inject(dependency.key.clone(), value);
            }
            let signature_model = self.signature_model().ok_or_else(|| {
                ConfigurationError::SignatureModelMissing {
                    handler: self.name.clone(),
                }
            })?;
            signature_model.parse_values_from_connection_kwargs(&raw)?
        } else {
            Kwargs::default()
        };

        let mut args = Arguments::new(connection, kwargs);
        if let Some(owner) = self.owner_instance() {
            args = args.with_owner(owner);
        }

        trace!(handler = %self.name, is_async = self.func.is_async(), "Calling handler");
        self.func
            .call(args)
            .await
            .map_err(DispatchError::from_handler)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use gantry_core::{
        BackgroundTask, BackgroundTasks, Cookie, JsonContainer, MediaType, Method, Request,
        StatusCode,
    };
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use tower::BoxError;

    use super::*;
    use crate::error::ValidationError;
    use crate::handler::{Body, Owner};
    use crate::inject::Inject;
    use crate::layer::Layer;
    use crate::permission::{DenyAll, PermissionClass};
    use crate::response::{Json, ReturnKind};
    use crate::signature::{Param, ParamType};

    async fn dispatch(handler: &RouteHandler, request: Request) -> DispatchResult<NativeResponse> {
        handler
            .get_response_for_request(request.into_connection(), &State::new())
            .await
    }

    #[tokio::test]
    async fn test_no_params_never_touch_the_body() {
        async fn ping() -> Result<&'static str, BoxError> {
            Ok("pong")
        }

        let handler = RouteHandler::builder("ping", "/ping").handler(ping).build().unwrap();
        let request = Arc::new(Request::builder(Method::GET, "/ping").body("ignored").build());
        let connection: Arc<dyn Connection> = request.clone();

        let response = handler
            .get_response_for_request(connection, &State::new())
            .await
            .unwrap();
        assert_eq!(response.json().unwrap(), json!("pong"));
        assert!(!handler.kwargs_model().unwrap().has_kwargs());
        assert_eq!(request.body_read_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_dict_with_configured_status_round_trips() {
        async fn create(Body(data): Body<Value>) -> Result<Value, BoxError> {
            Ok(json!({"created": data}))
        }

        let handler = RouteHandler::builder("create", "/items")
            .method(Method::POST)
            .status_code(StatusCode::CREATED)
            .media_type(MediaType::Json)
            .param(Param::body("data"))
            .handler(create)
            .build()
            .unwrap();
        let request = Request::builder(Method::POST, "/items")
            .json(&json!({"name": "bolt"}))
            .build();

        let response = dispatch(&handler, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json().unwrap(), json!({"created": {"name": "bolt"}}));
    }

    #[tokio::test]
    async fn test_dependencies_resolve_in_order_with_path_and_query() {
        async fn show(kwargs: Kwargs) -> Result<Value, BoxError> {
            let user = kwargs.dependency::<String>("user")?;
            let page: i64 = kwargs.get("page")?;
            Ok(json!({"user": user.as_str(), "page": page}))
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let db = Inject::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(String::from("db"))
        });
        let user = Inject::new(|kwargs: Kwargs| async move {
            let db = kwargs.dependency::<String>("db")?;
            let id: i64 = kwargs.get("user_id")?;
            Ok::<_, BoxError>(format!("{db}:{id}"))
        })
        .param(Param::dependency("db"))
        .param(Param::path("user_id", ParamType::Integer));

        let app = Layer::application("app").dependency("db", db).build();
        let api = Layer::group("api").parent(&app).dependency("user", user).build();
        let handler = RouteHandler::builder("show", "/users/{user_id}")
            .owner(&api)
            .param(Param::dependency("user"))
            .param(Param::query("page", ParamType::Integer).default(1))
            .handler(show)
            .build()
            .unwrap();

        let request = Request::builder(Method::GET, "/users/7")
            .path_param("user_id", "7")
            .build();
        let response = dispatch(&handler, request).await.unwrap();
        assert_eq!(response.json().unwrap(), json!({"user": "db:7", "page": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let keys: Vec<_> = handler
            .kwargs_model()
            .unwrap()
            .expected_dependencies()
            .iter()
            .map(|d| d.key.clone())
            .collect();
        assert_eq!(keys, vec!["db", "user"]);
    }

    #[tokio::test]
    async fn test_validation_error_is_field_level() {
        async fn page(kwargs: Kwargs) -> Result<Value, BoxError> {
            Ok(kwargs.value("page").cloned().unwrap_or_default())
        }

        let handler = RouteHandler::builder("page", "/")
            .param(Param::query("page", ParamType::Integer))
            .handler(page)
            .build()
            .unwrap();
        let request = Request::builder(Method::GET, "/").query("page", "two").build();

        let err = dispatch(&handler, request).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let DispatchError::Validation(ValidationError { errors }) = err else {
            panic!("expected a validation error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "page");
    }

    #[tokio::test]
    async fn test_permission_denial_skips_handler() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let handler = RouteHandler::builder("secret", "/")
            .permission(PermissionClass::of(|| DenyAll))
            .handler(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Value::Null)
                }
            })
            .build()
            .unwrap();

        let err = dispatch(&handler, Request::builder(Method::GET, "/").build())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::PermissionDenied(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_container_declaration_routes_through_container() {
        async fn wrapped() -> Result<JsonContainer, BoxError> {
            Ok(JsonContainer::new(json!({"ok": true})).cookie(Cookie::new("a", "1")))
        }

        let handler = RouteHandler::builder("wrapped", "/")
            .response_cookie(Cookie::new("a", "2"))
            .response_cookie(Cookie::new("b", "3"))
            .handler(wrapped)
            .build()
            .unwrap();
        assert_eq!(handler.return_kind(), ReturnKind::Container);

        let response = dispatch(&handler, Request::builder(Method::GET, "/").build())
            .await
            .unwrap();
        assert_eq!(response.json().unwrap(), json!({"ok": true}));
        assert_eq!(
            response.set_cookies(),
            vec!["a=1; Path=/; SameSite=lax", "b=3; Path=/; SameSite=lax"]
        );
    }

    #[tokio::test]
    async fn test_controller_owner_and_background() {
        struct Greeter {
            greeting: &'static str,
        }

        fn greet(owner: Owner<Greeter>, kwargs: Kwargs) -> Result<Json<String>, BoxError> {
            let name: String = kwargs.get("name")?;
            Ok(Json(format!("{}, {name}", owner.greeting)))
        }

        let controller = Layer::controller("greeter", Greeter { greeting: "hello" }).build();
        let handler = RouteHandler::builder("greet", "/greet")
            .owner(&controller)
            .param(Param::query("name", ParamType::String))
            .background(BackgroundTasks::single(BackgroundTask::new(|| async {})))
            .sync_handler(greet)
            .build()
            .unwrap();
        assert!(!handler.is_async());

        let request = Request::builder(Method::GET, "/greet").query("name", "ada").build();
        let response = dispatch(&handler, request).await.unwrap();
        assert_eq!(response.json().unwrap(), json!("hello, ada"));
        assert_eq!(response.background().map(BackgroundTasks::len), Some(1));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_dispatch() {
        async fn slow() -> Result<(), BoxError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        let handler = RouteHandler::builder("slow", "/").handler(slow).build().unwrap();
        let token = CancellationToken::new();
        let request = Request::builder(Method::GET, "/")
            .cancellation(token.clone())
            .build();
        token.cancel();

        let err = dispatch(&handler, request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
    }

    #[tokio::test]
    async fn test_handler_failure_is_boxed() {
        async fn broken() -> Result<Value, BoxError> {
            Err("storage offline".into())
        }

        let handler = RouteHandler::builder("broken", "/").handler(broken).build().unwrap();
        let err = dispatch(&handler, Request::builder(Method::GET, "/").build())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
        assert_eq!(err.exception().to_string(), "storage offline");
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_unknown_path_parameter_is_fatal() {
        let handler = RouteHandler::builder("bad", "/items")
            .param(Param::path("item_id", ParamType::Integer))
            .handler(|| async { Ok::<_, BoxError>(()) })
            .build()
            .unwrap();

        let err = dispatch(&handler, Request::builder(Method::GET, "/items").build())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
