//! Route shorthand accepted by [`Imposter::add_route`](crate::Imposter::add_route).
//!
//! A route is a uri pattern, an HTTP verb and the canned response to return.
//! Each route becomes exactly one Mountebank stub.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MbError, Result};

const SUPPORTED_VERBS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// A uri + verb with the response an imposter should serve for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub uri: String,
    pub verb: String,
    #[serde(default)]
    pub res: RouteResponse,
}

/// Canned response for a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(default)]
    pub response_body: String,
}

fn default_status_code() -> u16 {
    200
}

impl Default for RouteResponse {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            response_headers: HashMap::new(),
            response_body: String::new(),
        }
    }
}

/// Identifies a route inside an imposter (the "path to update")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub uri: String,
    pub verb: String,
}

impl RouteKey {
    pub fn new(uri: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            verb: verb.into().to_ascii_uppercase(),
        }
    }

    pub(crate) fn matches(&self, route: &Route) -> bool {
        self.uri == route.uri && self.verb.eq_ignore_ascii_case(&route.verb)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.uri)
    }
}

impl Route {
    pub fn new(uri: impl Into<String>, verb: impl Into<String>, res: RouteResponse) -> Self {
        Self {
            uri: uri.into(),
            verb: verb.into(),
            res,
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.uri.clone(), self.verb.clone())
    }

    /// Check the route and normalize the verb to upper case
    pub fn validate(mut self) -> Result<Self> {
        if self.uri.is_empty() {
            return Err(MbError::Validation("uri must not be empty".to_string()));
        }
        // Mountebank evaluates `matches` with JavaScript regexes, so paths are
        // passed through untouched; only other uris must compile here.
        if !self.uri.starts_with('/') {
            if let Err(e) = Regex::new(&self.uri) {
                return Err(MbError::Validation(format!(
                    "uri '{}' is neither a path nor a valid pattern: {e}",
                    self.uri
                )));
            }
        }

        let verb = self.verb.trim().to_ascii_uppercase();
        if !SUPPORTED_VERBS.contains(&verb.as_str()) {
            return Err(MbError::Validation(format!(
                "unsupported verb '{}' (expected one of {})",
                self.verb,
                SUPPORTED_VERBS.join(", ")
            )));
        }
        self.verb = verb;

        if !(100..=599).contains(&self.res.status_code) {
            return Err(MbError::Validation(format!(
                "status code {} is outside 100-599",
                self.res.status_code
            )));
        }

        Ok(self)
    }
}

impl RouteResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = body.into();
        self
    }

    /// JSON body with a matching `Content-Type`
    pub fn with_json<T: Serialize>(self, body: &T) -> Result<Self> {
        let body = serde_json::to_string(body).map_err(|e| MbError::Parse(e.to_string()))?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }
}
