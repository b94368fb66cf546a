//! Media types understood by the response family.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The payload format of a response body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    /// `application/json`
    #[default]
    Json,
    /// `text/html`
    Html,
    /// `text/plain`
    Text,
    /// `application/octet-stream`
    OctetStream,
    /// Any other media type, stored verbatim.
    Custom(String),
}

impl MediaType {
    /// Returns the media type as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::Text => "text/plain",
            Self::OctetStream => "application/octet-stream",
            Self::Custom(other) => other,
        }
    }

    /// Returns `true` for JSON media types, including `+json` suffixes.
    pub fn is_json(&self) -> bool {
        let value = self.as_str();
        value == "application/json" || value.ends_with("+json")
    }

    /// Renders the `content-type` header value.
    ///
    /// Text types carry an explicit utf-8 charset unless one is already present.
    pub fn content_type(&self) -> String {
        let value = self.as_str();
        if value.starts_with("text/") && !value.contains("charset") {
            format!("{value}; charset=utf-8")
        } else {
            value.to_string()
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MediaType {
    fn from(value: &str) -> Self {
        match value {
            "application/json" => Self::Json,
            "text/html" => Self::Html,
            "text/plain" => Self::Text,
            "application/octet-stream" => Self::OctetStream,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for MediaType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<MediaType> for String {
    fn from(value: MediaType) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types_round_trip_through_strings() {
        assert_eq!(MediaType::from("text/html"), MediaType::Html);
        assert_eq!(
            MediaType::from("application/vnd.api+json"),
            MediaType::Custom("application/vnd.api+json".into())
        );
        assert!(MediaType::from("application/vnd.api+json").is_json());
    }

    #[test]
    fn test_text_content_type_carries_charset() {
        assert_eq!(MediaType::Text.content_type(), "text/plain; charset=utf-8");
        assert_eq!(MediaType::Json.content_type(), "application/json");
    }
}
