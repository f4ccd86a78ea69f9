//! Mountebank wire types.
//!
//! Only the subset of the imposter schema this crate writes and reads back is
//! modelled. Unknown fields returned by Mountebank (`_links`, `requests`
//! contents, behaviors) are tolerated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Imposter Types
// ============================================================================

/// Imposter protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Request body for `POST /imposters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterDefinition {
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub record_requests: bool,
    #[serde(default)]
    pub stubs: Vec<Stub>,
}

/// Imposter as returned by `GET /imposters/:port` and `POST /imposters`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterDetail {
    pub port: u16,
    /// Kept as text: Mountebank also reports tcp, smtp and custom protocols
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub number_of_requests: u64,
    #[serde(default)]
    pub stubs: Vec<Stub>,
    #[serde(default)]
    pub requests: Vec<serde_json::Value>,
}

impl ImposterDetail {
    /// First response of the stub at `index`, if it is an `is` response
    pub fn is_response(&self, index: usize) -> Option<&IsResponse> {
        self.stubs
            .get(index)
            .and_then(|stub| stub.responses.first())
            .and_then(|response| response.is.as_ref())
    }
}

/// Body of `GET /imposters` and `DELETE /imposters`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpostersResponse {
    #[serde(default)]
    pub imposters: Vec<ImposterDetail>,
}

impl ImpostersResponse {
    pub fn ports(&self) -> Vec<u16> {
        self.imposters.iter().map(|i| i.port).collect()
    }
}

/// Error envelope returned by Mountebank
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Stub Types
// ============================================================================

/// Predicate/response pair inside an imposter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stub {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub responses: Vec<StubResponse>,
}

/// Mountebank predicate.
///
/// Exactly one operator is normally set; the struct form keeps modifiers such
/// as `caseSensitive` next to the operator the way Mountebank does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_equals: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<RequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<RequestFields>,
    /// Field names mapped to booleans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<Predicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<Predicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Predicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<String>,
}

impl Predicate {
    /// Regex match on the given request fields
    pub fn matches(fields: RequestFields) -> Self {
        Self {
            matches: Some(fields),
            ..Default::default()
        }
    }

    pub fn equals(fields: RequestFields) -> Self {
        Self {
            equals: Some(fields),
            ..Default::default()
        }
    }
}

/// Request fields a predicate operator is applied to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Anything else (`requestFrom`, `data`, ...)
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl RequestFields {
    pub fn method_and_path(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Response within a stub
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StubResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<IsResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    /// Accepts both `_behaviors` and the array-valued `behaviors` Mountebank echoes back
    #[serde(
        rename = "_behaviors",
        alias = "behaviors",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub behaviors: Option<serde_json::Value>,
}

impl StubResponse {
    pub fn is(response: IsResponse) -> Self {
        Self {
            is: Some(response),
            ..Default::default()
        }
    }
}

/// Canned `is` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsResponse {
    #[serde(
        default = "default_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// "text" (default) or "binary" (body is base64-encoded)
    #[serde(rename = "_mode", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl IsResponse {
    /// Body as sent on the wire; JSON bodies are re-serialized
    pub fn body_text(&self) -> String {
        match &self.body {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

fn default_protocol() -> String {
    Protocol::Http.as_str().to_string()
}

pub(crate) fn default_status_code() -> u16 {
    200
}

/// Deserialize statusCode from either a number or a string
pub(crate) fn deserialize_status_code<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| D::Error::custom("invalid status code number")),
        serde_json::Value::String(s) => s
            .parse::<u16>()
            .map_err(|_| D::Error::custom(format!("invalid status code string: {s}"))),
        _ => Err(D::Error::custom("statusCode must be a number or string")),
    }
}
