//! Connection settings and imposter files.
//!
//! `MountebankConfig` says where the admin API lives. `ImposterFile` is the
//! on-disk form of an imposter (YAML or JSON) used by the CLI and by tests
//! that keep their routes next to the fixtures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MbError, Result};
use crate::imposter::ImposterOptions;
use crate::route::Route;
use crate::types::Protocol;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 2525;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where to find the Mountebank admin API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountebankConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for MountebankConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MountebankConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Build from `MB_HOST`, `MB_PORT` and `MB_TIMEOUT_SECS`, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("MB_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup("MB_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| MbError::Config(format!("MB_PORT is not a valid port: {port}")))?;
        }
        if let Some(secs) = lookup("MB_TIMEOUT_SECS") {
            config.timeout_secs = secs.trim().parse().map_err(|_| {
                MbError::Config(format!("MB_TIMEOUT_SECS is not a number: {secs}"))
            })?;
        }

        Ok(config)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// An imposter and its routes, as stored in a fixture file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterFile {
    pub imposter_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl ImposterFile {
    /// Load from a YAML or JSON file (JSON is valid YAML)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| MbError::Config(format!("{}: {e}", path.display())))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| MbError::Config(e.to_string()))
    }

    /// Options for an `Imposter` built from this file
    pub fn options(&self, mountebank: MountebankConfig) -> ImposterOptions {
        ImposterOptions {
            imposter_port: self.imposter_port,
            protocol: self.protocol,
            name: self.name.clone(),
            mountebank,
        }
    }
}
