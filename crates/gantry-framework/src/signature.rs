//! Parameter declarations and the signature model.
//!
//! A handler declares its parameters explicitly as [`Param`]s. The
//! [`SignatureModel`] built from them knows, for every parameter, where its
//! value comes from, what type it must coerce to, and whether it may be
//! omitted. It is built once per handler (and once per dependency provider)
//! and then validates the raw values the kwargs model extracts from each
//! connection.
//!
//! # Example
//!
//! ```rust,ignore
//! let params = [
//!     Param::path("id", ParamType::Integer),
//!     Param::query("verbose", ParamType::Boolean).default(false),
//!     Param::header("x_api_key", ParamType::String),
//!     Param::body("data"),
//!     Param::dependency("db"),
//! ];
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::error::{ConfigurationError, FieldError, ValidationError};
use crate::kwargs::{Kwargs, RawKwargs};

// =============================================================================
// ParamSource / ParamType
// =============================================================================

/// Where a parameter's raw value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    /// Produced by a dependency provider.
    Dependency,
}

impl ParamSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type a raw value is coerced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    /// Any JSON value. Strings holding JSON documents are parsed.
    Json,
    Array(Box<ParamType>),
}

impl ParamType {
    pub fn array(inner: ParamType) -> Self {
        Self::Array(Box::new(inner))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Coerces a raw value into this type.
    ///
    /// Query, path, header and cookie values always arrive as strings, so
    /// strings are parsed into numbers and booleans.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        match self {
            Self::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("value is not a valid string".to_string()),
            },
            Self::Integer => {
                coerce_integer(value).ok_or_else(|| "value is not a valid integer".to_string())
            }
            Self::Float => {
                coerce_float(value).ok_or_else(|| "value is not a valid float".to_string())
            }
            Self::Boolean => coerce_bool(value)
                .ok_or_else(|| "value could not be parsed to a boolean".to_string()),
            Self::Json => match value {
                Value::String(text) => {
                    Ok(serde_json::from_str(text).unwrap_or_else(|_| value.clone()))
                }
                other => Ok(other.clone()),
            },
            Self::Array(inner) => match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        inner
                            .coerce(item)
                            .map_err(|msg| format!("item {index}: {msg}"))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                scalar => Ok(Value::Array(vec![inner.coerce(scalar)?])),
            },
        }
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::String(text) => text.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(number).map(Value::Number)
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64()? {
            0 => Some(Value::Bool(false)),
            1 => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// Param
// =============================================================================

/// A declared handler or dependency parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub source: ParamSource,
    pub ty: ParamType,
    /// Name on the wire, when it differs from `name`.
    pub alias: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
}

impl Param {
    fn new(name: impl Into<String>, source: ParamSource, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            source,
            ty,
            alias: None,
            default: None,
            required: true,
        }
    }

    pub fn path(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Path, ty)
    }

    pub fn query(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Query, ty)
    }

    /// A header parameter. Without an alias, underscores in `name` map to
    /// hyphens on the wire.
    pub fn header(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Header, ty)
    }

    pub fn cookie(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ParamSource::Cookie, ty)
    }

    /// The request body. Must be named `data` or `payload`.
    pub fn body(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Body, ParamType::Json)
    }

    /// A value produced by the dependency bound under `name`.
    pub fn dependency(name: impl Into<String>) -> Self {
        Self::new(name, ParamSource::Dependency, ParamType::Json)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets a default, making the parameter optional.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    /// Makes the parameter optional with a `null` default.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// The name the value is looked up under on the connection.
    pub fn wire_name(&self) -> String {
        match (&self.alias, self.source) {
            (Some(alias), _) => alias.clone(),
            (None, ParamSource::Header) => self.name.replace('_', "-").to_ascii_lowercase(),
            (None, _) => self.name.clone(),
        }
    }
}

// =============================================================================
// SignatureModel
// =============================================================================

/// Names a body parameter may use.
pub const BODY_PARAM_NAMES: [&str; 2] = ["data", "payload"];

/// The validated description of a function's parameters.
#[derive(Debug, Clone)]
pub struct SignatureModel {
    fn_name: String,
    params: Vec<Param>,
}

impl SignatureModel {
    /// Builds the model for `fn_name`.
    ///
    /// Query parameters whose name matches a dependency visible to the
    /// function are treated as that dependency.
    pub fn create(
        fn_name: &str,
        params: &[Param],
        dependency_names: &BTreeSet<String>,
    ) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut has_body = false;
        let mut resolved = Vec::with_capacity(params.len());

        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigurationError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }

            let mut param = param.clone();
            if param.source == ParamSource::Query && dependency_names.contains(&param.name) {
                param.source = ParamSource::Dependency;
            }

            if param.source == ParamSource::Body {
                if !BODY_PARAM_NAMES.contains(&param.name.as_str()) {
                    return Err(ConfigurationError::InvalidBodyParameter { name: param.name });
                }
                if std::mem::replace(&mut has_body, true) {
                    return Err(ConfigurationError::MultipleBodyParameters {
                        handler: fn_name.to_string(),
                    });
                }
            }
            resolved.push(param);
        }

        trace!(function = fn_name, params = resolved.len(), "Built signature model");
        Ok(Self {
            fn_name: fn_name.to_string(),
            params: resolved,
        })
    }

    pub fn fn_name(&self) -> &str {
        &self.fn_name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn field(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn body_param(&self) -> Option<&Param> {
        self.params.iter().find(|p| p.source == ParamSource::Body)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Validates and coerces raw connection values into keyword arguments.
    ///
    /// Every failing field is collected into one [`ValidationError`].
    pub fn parse_values_from_connection_kwargs(
        &self,
        raw: &RawKwargs,
    ) -> Result<Kwargs, ValidationError> {
        let mut values = Map::new();
        let mut errors = Vec::new();
        let mut kwargs = Kwargs::default();

        for param in &self.params {
            if param.source == ParamSource::Dependency {
                match raw.injected(&param.name) {
                    Some(value) => kwargs.inject(&param.name, value),
                    None => errors.push(FieldError::new(
                        param.source,
                        &param.name,
                        "dependency not resolved",
                    )),
                }
                continue;
            }

            match raw.value(&param.name).filter(|v| !v.is_null()) {
                Some(value) => match param.ty.coerce(value) {
                    Ok(value) => {
                        values.insert(param.name.clone(), value);
                    }
                    Err(message) => {
                        errors.push(FieldError::new(param.source, &param.name, message))
                    }
                },
                None => match (&param.default, param.required) {
                    (Some(default), _) => {
                        values.insert(param.name.clone(), default.clone());
                    }
                    (None, false) => {
                        values.insert(param.name.clone(), Value::Null);
                    }
                    (None, true) => {
                        errors.push(FieldError::new(param.source, &param.name, "field required"))
                    }
                },
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::new(errors));
        }
        kwargs.set_values(values);
        Ok(kwargs)
    }
}
