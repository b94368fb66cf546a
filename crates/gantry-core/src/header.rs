//! Declared response headers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A header declared on a layer or handler.
///
/// Only `value` reaches the wire; `description` documents the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResponseHeader {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&str> for ResponseHeader {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResponseHeader {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Declared headers keyed by header name.
pub type ResponseHeaders = BTreeMap<String, ResponseHeader>;

/// Plain `name -> value` headers, as carried by responses and containers.
pub type HeaderValues = BTreeMap<String, String>;
