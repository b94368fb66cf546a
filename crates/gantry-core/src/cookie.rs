//! Response cookie declarations.
//!
//! A [`Cookie`] is declared on a layer, a handler, a [`Response`](crate::Response)
//! or a [`ResponseContainer`](crate::ResponseContainer), merged when the
//! response is built, and finally rendered into a `Set-Cookie` header line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `SameSite` attribute of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "lax",
            Self::Strict => "strict",
            Self::None => "none",
        }
    }
}

/// A cookie to be set on the response.
///
/// Unset optional attributes are omitted both from the normalized mapping and
/// from the rendered header. `description` is documentation only and never
/// reaches the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,

    /// Expiry, in seconds from the moment the header is rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub httponly: Option<bool>,

    #[serde(default)]
    pub samesite: SameSite,

    #[serde(default, skip_serializing)]
    pub description: Option<String>,
}

/// `Fri, 31 Dec 9999 23:59:59 GMT`, the last date with a four-digit year.
const MAX_EXPIRES_TIMESTAMP: i64 = 253_402_300_799;

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Creates a cookie with the given key and value and default attributes.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            max_age: None,
            expires: None,
            path: default_path(),
            domain: None,
            secure: None,
            httponly: None,
            samesite: SameSite::default(),
            description: None,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn expires(mut self, seconds: i64) -> Self {
        self.expires = Some(seconds);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn httponly(mut self, httponly: bool) -> Self {
        self.httponly = Some(httponly);
        self
    }

    pub fn samesite(mut self, samesite: SameSite) -> Self {
        self.samesite = samesite;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns this cookie as a mapping of its wire-relevant, set attributes.
    pub fn normalized(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Renders the value of a `Set-Cookie` header for this cookie.
    ///
    /// Attributes are emitted in lexical order, matching the classic
    /// cookie-jar output most clients are tested against.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!(
            "{}={}",
            self.key,
            quote_value(self.value.as_deref().unwrap_or(""))
        )];

        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if let Some(at) = self.expires.and_then(expires_at) {
            parts.push(format!(
                "expires={}",
                at.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        if self.httponly == Some(true) {
            parts.push("HttpOnly".to_string());
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        parts.push(format!("Path={}", self.path));
        parts.push(format!("SameSite={}", self.samesite.as_str()));
        if self.secure == Some(true) {
            parts.push("Secure".to_string());
        }

        parts.join("; ")
    }

    /// Renders the full `Set-Cookie: ...` header line.
    pub fn to_header(&self) -> String {
        format!("Set-Cookie: {}", self.to_header_value())
    }
}

/// Resolves a relative expiry, clamped to the representable HTTP date range.
fn expires_at(seconds: i64) -> Option<DateTime<Utc>> {
    let timestamp = Utc::now()
        .timestamp()
        .saturating_add(seconds)
        .clamp(0, MAX_EXPIRES_TIMESTAMP);
    DateTime::from_timestamp(timestamp, 0)
}

/// Quotes a cookie value when it contains characters outside the token set.
fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ',' | ';' | '"' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_skips_unset_fields_and_description() {
        let cookie = Cookie::new("session", "abc").description("login session");
        let map = cookie.normalized();

        assert_eq!(map.get("key"), Some(&Value::from("session")));
        assert_eq!(map.get("value"), Some(&Value::from("abc")));
        assert_eq!(map.get("path"), Some(&Value::from("/")));
        assert_eq!(map.get("samesite"), Some(&Value::from("lax")));
        assert!(!map.contains_key("description"));
        assert!(!map.contains_key("domain"));
        assert!(!map.contains_key("max_age"));
    }

    #[test]
    fn test_header_value_renders_attributes_in_order() {
        let cookie = Cookie::new("id", "42")
            .domain("example.com")
            .httponly(true)
            .max_age(60)
            .secure(true)
            .samesite(SameSite::Strict);

        assert_eq!(
            cookie.to_header_value(),
            "id=42; Domain=example.com; HttpOnly; Max-Age=60; Path=/; SameSite=strict; Secure"
        );
    }

    #[test]
    fn test_false_flags_are_omitted() {
        let cookie = Cookie::new("id", "42").secure(false).httponly(false);
        assert_eq!(cookie.to_header(), "Set-Cookie: id=42; Path=/; SameSite=lax");
    }

    #[test]
    fn test_zero_max_age_expires_the_cookie() {
        let cookie = Cookie::new("session", "").max_age(0);
        assert_eq!(cookie.to_header_value(), "session=; Max-Age=0; Path=/; SameSite=lax");
    }

    #[test]
    fn test_values_with_separators_are_quoted() {
        let cookie = Cookie::new("greeting", "hello, world");
        assert!(cookie.to_header_value().starts_with("greeting=\"hello, world\";"));
    }

    #[test]
    fn test_expires_renders_http_date() {
        let header = Cookie::new("id", "1").expires(3600).to_header_value();
        assert!(header.contains("expires="));
        assert!(header.contains(" GMT"));
    }

    #[test]
    fn test_out_of_range_expires_is_clamped() {
        let far = Cookie::new("a", "1").expires(i64::MAX / 2).to_header_value();
        assert!(far.contains("expires=Fri, 31 Dec 9999 23:59:59 GMT"));

        let past = Cookie::new("a", "1").expires(i64::MIN).to_header_value();
        assert!(past.contains("expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }
}
