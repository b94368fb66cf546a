//! The kwargs model: binding connection data to handler arguments.
//!
//! [`KwargsModel`] is the compiled, per-handler extraction plan. It is built
//! once from the handler's [`SignatureModel`], the merged dependency set and
//! the path parameter names, and knows:
//!
//! - which raw values to pull from the connection and where to find them
//!   ([`to_kwargs`](KwargsModel::to_kwargs)),
//! - in which order dependencies must be resolved so that every provider sees
//!   its own inputs ([`expected_dependencies`](KwargsModel::expected_dependencies)),
//! - how to run one provider against the values gathered so far
//!   ([`resolve_dependency`](KwargsModel::resolve_dependency)).
//!
//! Raw values land in [`RawKwargs`]; the signature model validates them into
//! the [`Kwargs`] handed to the handler.

use std::any::{Any, type_name};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use gantry_core::Connection;

use crate::error::{ConfigurationError, DispatchError, ExtractError, ExtractResult, ValidationError};
use crate::inject::{Dependencies, Inject};
use crate::signature::{ParamSource, SignatureModel};

/// A resolved dependency value.
pub type Injected = Arc<dyn Any + Send + Sync>;

// =============================================================================
// Kwargs
// =============================================================================

/// Validated keyword arguments.
#[derive(Clone, Default)]
pub struct Kwargs {
    values: Map<String, Value>,
    injected: HashMap<String, Injected>,
}

impl Kwargs {
    /// Returns the coerced value of a connection parameter.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Deserializes a parameter into `T`.
    ///
    /// Dependencies that produced a [`serde_json::Value`] are accepted too.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> ExtractResult<T> {
        let value = match self.values.get(name) {
            Some(value) => value.clone(),
            None => {
                let injected = self.injected.get(name).ok_or_else(|| ExtractError::Missing {
                    name: name.to_string(),
                })?;
                let value = Arc::clone(injected).downcast::<Value>().map_err(|_| {
                    ExtractError::TypeMismatch {
                        name: name.to_string(),
                        expected: "JSON value",
                    }
                })?;
                Value::clone(&value)
            }
        };
        serde_json::from_value(value).map_err(|err| ExtractError::Deserialize {
            name: name.to_string(),
            message: err.to_string(),
        })
    }

    /// Returns the value a dependency provider produced.
    pub fn dependency<T: Send + Sync + 'static>(&self, name: &str) -> ExtractResult<Arc<T>> {
        let injected = self.injected.get(name).ok_or_else(|| ExtractError::Missing {
            name: name.to_string(),
        })?;
        Arc::clone(injected)
            .downcast::<T>()
            .map_err(|_| ExtractError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.injected.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.injected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.injected.is_empty()
    }

    pub(crate) fn set_values(&mut self, values: Map<String, Value>) {
        self.values = values;
    }

    pub(crate) fn inject(&mut self, name: &str, value: Injected) {
        self.injected.insert(name.to_string(), value);
    }
}

impl fmt::Debug for Kwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut injected: Vec<_> = self.injected.keys().collect();
        injected.sort();
        f.debug_struct("Kwargs")
            .field("values", &self.values)
            .field("injected", &injected)
            .finish()
    }
}

// =============================================================================
// RawKwargs
// =============================================================================

type PendingBody = BoxFuture<'static, Result<Value, DispatchError>>;

/// Unvalidated values extracted from a connection.
///
/// The body is not read until [`resolve_body`](Self::resolve_body) is awaited.
#[derive(Default)]
pub struct RawKwargs {
    values: Map<String, Value>,
    injected: HashMap<String, Injected>,
    // Behind a lock so that `&RawKwargs` stays `Send` across provider awaits.
    body: Mutex<Option<(String, PendingBody)>>,
}

impl RawKwargs {
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn inject(&mut self, name: impl Into<String>, value: Injected) {
        self.injected.insert(name.into(), value);
    }

    pub fn injected(&self, name: &str) -> Option<Injected> {
        self.injected.get(name).cloned()
    }

    pub fn has_pending_body(&self) -> bool {
        self.body.lock().is_some()
    }

    /// Awaits the pending body read, if any, and stores the parsed value.
    pub async fn resolve_body(&mut self) -> Result<(), DispatchError> {
        let pending = self.body.get_mut().take();
        if let Some((name, pending)) = pending {
            let value = pending.await?;
            self.values.insert(name, value);
        }
        Ok(())
    }

    fn defer_body(&mut self, name: String, pending: PendingBody) {
        *self.body.get_mut() = Some((name, pending));
    }
}

impl fmt::Debug for RawKwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawKwargs")
            .field("values", &self.values)
            .field("pending_body", &self.has_pending_body())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// KwargsModel
// =============================================================================

/// A connection value the model extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedParam {
    pub name: String,
    pub source: ParamSource,
    pub wire_name: String,
    pub is_array: bool,
}

/// One step of the dependency resolution plan.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub key: String,
    pub inject: Inject,
    pub signature_model: Arc<SignatureModel>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// The compiled extraction plan of one handler.
#[derive(Debug, Clone)]
pub struct KwargsModel {
    expected_params: Vec<ExpectedParam>,
    expected_dependencies: Vec<ResolvedDependency>,
    has_kwargs: bool,
}

impl KwargsModel {
    /// Builds the plan for a handler.
    ///
    /// Fails when a path parameter is not part of the path pattern, a
    /// requested dependency is not bound by any layer, dependencies form a
    /// cycle, or two functions read the same name from different sources.
    pub fn create_for_signature_model(
        signature_model: &SignatureModel,
        dependencies: &Dependencies,
        path_parameters: &BTreeSet<String>,
    ) -> Result<Self, ConfigurationError> {
        let handler = signature_model.fn_name();
        let dependency_names: BTreeSet<String> =
            dependencies.keys().map(str::to_string).collect();

        let mut order = Vec::new();
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        for param in signature_model.params() {
            if param.source == ParamSource::Dependency {
                visit(
                    handler,
                    &param.name,
                    dependencies,
                    &dependency_names,
                    &mut marks,
                    &mut stack,
                    &mut order,
                )?;
            }
        }

        let mut expected_params: Vec<ExpectedParam> = Vec::new();
        let models = std::iter::once(signature_model)
            .chain(order.iter().map(|dep| dep.signature_model.as_ref()));
        for model in models {
            for param in model.params() {
                if param.source == ParamSource::Dependency {
                    continue;
                }
                if param.source == ParamSource::Path && !path_parameters.contains(&param.name) {
                    return Err(ConfigurationError::UnknownPathParameter {
                        handler: model.fn_name().to_string(),
                        name: param.name.clone(),
                    });
                }
                match expected_params.iter().find(|p| p.name == param.name) {
                    Some(existing) if existing.source != param.source => {
                        return Err(ConfigurationError::ConflictingParameter {
                            name: param.name.clone(),
                            first: existing.source,
                            second: param.source,
                        });
                    }
                    Some(_) => {}
                    None => expected_params.push(ExpectedParam {
                        name: param.name.clone(),
                        source: param.source,
                        wire_name: param.wire_name(),
                        is_array: param.ty.is_array(),
                    }),
                }
            }
        }

        debug!(
            handler,
            params = expected_params.len(),
            dependencies = order.len(),
            "Built kwargs model"
        );

        Ok(Self {
            expected_params,
            expected_dependencies: order,
            has_kwargs: !signature_model.is_empty(),
        })
    }

    /// `false` when the handler declares no parameters at all.
    pub fn has_kwargs(&self) -> bool {
        self.has_kwargs
    }

    pub fn expected_params(&self) -> &[ExpectedParam] {
        &self.expected_params
    }

    /// Dependencies in resolution order: every provider comes after the
    /// providers it depends on.
    pub fn expected_dependencies(&self) -> &[ResolvedDependency] {
        &self.expected_dependencies
    }

    /// Extracts raw values from the connection.
    ///
    /// The body is only scheduled for reading, never read here.
    pub fn to_kwargs(&self, connection: &Arc<dyn Connection>) -> RawKwargs {
        let mut raw = RawKwargs::default();

        for param in &self.expected_params {
            let wire = param.wire_name.as_str();
            let value = match param.source {
                ParamSource::Path => {
                    connection.path_params().get(wire).cloned().map(Value::String)
                }
                ParamSource::Query => {
                    let values = connection.query_values(wire);
                    multi_value(values, param.is_array)
                }
                ParamSource::Header => {
                    let values: Vec<&str> = connection
                        .headers()
                        .get_all(wire)
                        .iter()
                        .filter_map(|v| v.to_str().ok())
                        .collect();
                    multi_value(values, param.is_array)
                }
                ParamSource::Cookie => {
                    connection.cookies().get(wire).cloned().map(Value::String)
                }
                ParamSource::Body => {
                    let pending = read_body(Arc::clone(connection), param.name.clone()).boxed();
                    raw.defer_body(param.name.clone(), pending);
                    None
                }
                ParamSource::Dependency => None,
            };

            if let Some(value) = value {
                raw.insert(param.name.clone(), value);
            }
        }

        trace!(extracted = raw.values.len(), "Extracted raw kwargs");
        raw
    }

    /// Runs one provider with the values gathered so far.
    pub async fn resolve_dependency(
        &self,
        dependency: &ResolvedDependency,
        raw: &RawKwargs,
    ) -> Result<Injected, DispatchError> {
        let kwargs = dependency
            .signature_model
            .parse_values_from_connection_kwargs(raw)?;
        trace!(
            key = %dependency.key,
            provider = %dependency.inject.name(),
            "Resolving dependency"
        );
        dependency
            .inject
            .call(kwargs)
            .await
            .map_err(|source| DispatchError::Dependency {
                key: dependency.key.clone(),
                source,
            })
    }
}

/// Depth-first post-order walk producing the resolution plan.
fn visit(
    handler: &str,
    key: &str,
    dependencies: &Dependencies,
    dependency_names: &BTreeSet<String>,
    marks: &mut HashMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<ResolvedDependency>,
) -> Result<(), ConfigurationError> {
    match marks.get(key) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|k| k == key).unwrap_or(0);
            let mut cycle: Vec<&str> = stack[start..].iter().map(String::as_str).collect();
            cycle.push(key);
            return Err(ConfigurationError::DependencyCycle {
                path: cycle.join(" -> "),
            });
        }
        None => {}
    }

    let inject = dependencies
        .get(key)
        .ok_or_else(|| ConfigurationError::MissingDependency {
            handler: handler.to_string(),
            key: key.to_string(),
        })?;

    marks.insert(key.to_string(), Mark::Visiting);
    stack.push(key.to_string());

    let signature_model = inject.signature_model(dependency_names)?;
    for param in signature_model.params() {
        if param.source == ParamSource::Dependency {
            visit(
                handler,
                &param.name,
                dependencies,
                dependency_names,
                marks,
                stack,
                order,
            )?;
        }
    }

    stack.pop();
    marks.insert(key.to_string(), Mark::Done);
    order.push(ResolvedDependency {
        key: key.to_string(),
        inject: inject.clone(),
        signature_model,
    });
    Ok(())
}

/// Repeated values become an array only for array-typed parameters; scalars
/// take the last value.
fn multi_value(values: Vec<&str>, is_array: bool) -> Option<Value> {
    if is_array {
        if values.is_empty() {
            return None;
        }
        return Some(Value::Array(
            values.into_iter().map(|v| Value::String(v.to_string())).collect(),
        ));
    }
    values.last().map(|v| Value::String((*v).to_string()))
}

/// Reads and parses the body. An empty body is `null`.
async fn read_body(connection: Arc<dyn Connection>, name: String) -> Result<Value, DispatchError> {
    let bytes = connection.body().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|err| {
        ValidationError::single(ParamSource::Body, name, format!("invalid JSON: {err}")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{Param, ParamType};
    use gantry_core::{Method, Request};
    use serde_json::json;
    use tower::BoxError;

    fn model(params: &[Param], deps: &Dependencies, path: &[&str]) -> KwargsModel {
        let names = deps.keys().map(str::to_string).collect();
        let signature = SignatureModel::create("handler", params, &names).unwrap();
        let path = path.iter().map(|s| s.to_string()).collect();
        KwargsModel::create_for_signature_model(&signature, deps, &path).unwrap()
    }

    fn try_model(
        params: &[Param],
        deps: &Dependencies,
        path: &[&str],
    ) -> Result<KwargsModel, ConfigurationError> {
        let names = deps.keys().map(str::to_string).collect();
        let signature = SignatureModel::create("handler", params, &names)?;
        let path = path.iter().map(|s| s.to_string()).collect();
        KwargsModel::create_for_signature_model(&signature, deps, &path)
    }

    #[test]
    fn test_no_params_means_no_kwargs() {
        let model = model(&[], &Dependencies::new(), &[]);
        assert!(!model.has_kwargs());
        assert!(model.expected_params().is_empty());
    }

    #[test]
    fn test_dependencies_resolve_in_topological_order() {
        let deps = Dependencies::new()
            .with(
                "user",
                Inject::value(()).param(Param::dependency("session")),
            )
            .with(
                "session",
                Inject::value(()).param(Param::dependency("db")),
            )
            .with("db", Inject::value(()))
            .with("unused", Inject::value(()));

        let model = model(&[Param::dependency("user")], &deps, &[]);
        let keys: Vec<_> = model
            .expected_dependencies()
            .iter()
            .map(|d| d.key.as_str())
            .collect();
        assert_eq!(keys, vec!["db", "session", "user"]);
    }

    #[test]
    fn test_dependency_cycle_is_reported() {
        let deps = Dependencies::new()
            .with("a", Inject::value(()).param(Param::dependency("b")))
            .with("b", Inject::value(()).param(Param::dependency("a")));

        let err = try_model(&[Param::dependency("a")], &deps, &[]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DependencyCycle {
                path: "a -> b -> a".into()
            }
        );
    }

    #[test]
    fn test_missing_dependency_and_unknown_path_param() {
        let err = try_model(&[Param::dependency("db")], &Dependencies::new(), &[]).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDependency { .. }));

        let err = try_model(&[Param::path("id", ParamType::Integer)], &Dependencies::new(), &[])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPathParameter { .. }));
    }

    #[test]
    fn test_provider_params_conflicting_with_handler_params() {
        let deps = Dependencies::new().with(
            "auth",
            Inject::value(()).param(Param::header("token", ParamType::String)),
        );
        let err = try_model(
            &[
                Param::query("token", ParamType::String),
                Param::dependency("auth"),
            ],
            &deps,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::ConflictingParameter { .. }));
    }

    #[tokio::test]
    async fn test_to_kwargs_reads_every_source_but_defers_body() {
        let model = model(
            &[
                Param::path("id", ParamType::Integer),
                Param::query("tag", ParamType::array(ParamType::String)),
                Param::query("page", ParamType::Integer),
                Param::header("x_token", ParamType::String),
                Param::cookie("session", ParamType::String),
                Param::body("data"),
            ],
            &Dependencies::new(),
            &["id"],
        );

        let request = Arc::new(
            Request::builder(Method::POST, "/items/3")
                .path_param("id", "3")
                .query("tag", "a")
                .query("tag", "b")
                .query("page", "1")
                .query("page", "2")
                .header("x-token", "t")
                .cookie("session", "s")
                .json(&json!({"name": "bolt"}))
                .build(),
        );
        let connection: Arc<dyn Connection> = request.clone();

        let mut raw = model.to_kwargs(&connection);
        assert_eq!(raw.value("id"), Some(&json!("3")));
        assert_eq!(raw.value("tag"), Some(&json!(["a", "b"])));
        assert_eq!(raw.value("page"), Some(&json!("2")));
        assert_eq!(raw.value("x_token"), Some(&json!("t")));
        assert_eq!(raw.value("session"), Some(&json!("s")));
        assert!(raw.has_pending_body());
        assert_eq!(request.body_read_count(), 0);

        raw.resolve_body().await.unwrap();
        assert_eq!(raw.value("data"), Some(&json!({"name": "bolt"})));
        assert_eq!(request.body_read_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_body_is_a_validation_error() {
        let model = model(&[Param::body("payload")], &Dependencies::new(), &[]);
        let connection = Request::builder(Method::POST, "/")
            .body("{not json")
            .build()
            .into_connection();

        let mut raw = model.to_kwargs(&connection);
        let err = raw.resolve_body().await.unwrap_err();
        match err {
            DispatchError::Validation(err) => assert_eq!(err.errors[0].field, "payload"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_dependency_feeds_provider_its_inputs() {
        let deps = Dependencies::new().with(
            "greeting",
            Inject::new(|kwargs: Kwargs| async move {
                let name: String = kwargs.get("name")?;
                Ok::<_, BoxError>(format!("hello {name}"))
            })
            .param(Param::query("name", ParamType::String)),
        );
        let model = model(&[Param::dependency("greeting")], &deps, &[]);
        let connection = Request::builder(Method::GET, "/")
            .query("name", "ada")
            .build()
            .into_connection();

        let raw = model.to_kwargs(&connection);
        let plan = &model.expected_dependencies()[0];
        let value = model.resolve_dependency(plan, &raw).await.unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "hello ada");
    }

    #[test]
    fn test_kwargs_typed_access() {
        let mut kwargs = Kwargs::default();
        kwargs.set_values(Map::from_iter([("page".to_string(), json!(2))]));
        kwargs.inject("db", Arc::new(5_u8));
        kwargs.inject("settings", Arc::new(json!({"debug": true})));

        assert_eq!(kwargs.get::<u32>("page").unwrap(), 2);
        assert_eq!(*kwargs.dependency::<u8>("db").unwrap(), 5);
        assert_eq!(
            kwargs.get::<serde_json::Map<String, Value>>("settings").unwrap()["debug"],
            json!(true)
        );
        assert!(matches!(
            kwargs.dependency::<String>("db"),
            Err(ExtractError::TypeMismatch { .. })
        ));
        assert!(matches!(kwargs.get::<u32>("missing"), Err(ExtractError::Missing { .. })));
    }
}
