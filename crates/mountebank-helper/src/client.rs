//! HTTP client for the Mountebank admin API

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::MountebankConfig;
use crate::error::{MbError, Result};
use crate::types::{ErrorResponse, ImposterDefinition, ImposterDetail, ImpostersResponse};

/// Status and raw body of an admin API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbResponse {
    pub status: u16,
    pub body: String,
}

impl MbResponse {
    pub fn is_created(&self) -> bool {
        self.status == StatusCode::CREATED.as_u16()
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| MbError::Parse(e.to_string()))
    }
}

/// HTTP client for the Mountebank admin API
#[derive(Debug, Clone)]
pub struct MountebankClient {
    client: Client,
    base_url: String,
}

impl MountebankClient {
    /// Create a new client for the configured Mountebank instance
    pub fn new(config: &MountebankConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    /// Create a client for an explicit base URL such as `http://mb:2525`
    pub fn with_base_url(base_url: &str, config: &MountebankConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Same Mountebank instance with a different per-request timeout
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: self.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether Mountebank answers on its root endpoint
    pub async fn is_running(&self) -> Result<bool> {
        match self.send(Method::GET, "/", None).await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) if e.is_connection() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an imposter (`POST /imposters`)
    pub async fn create_imposter(&self, definition: &ImposterDefinition) -> Result<MbResponse> {
        let body = serde_json::to_value(definition).map_err(|e| MbError::Parse(e.to_string()))?;
        let resp = self.send(Method::POST, "/imposters", Some(&body)).await?;
        let response = Self::read(resp).await?;
        info!(
            "Created imposter on port {} with {} stub(s)",
            definition.port,
            definition.stubs.len()
        );
        Ok(response)
    }

    /// Get the details for a specific imposter
    pub async fn get_imposter(&self, port: u16) -> Result<ImposterDetail> {
        self.get_imposter_raw(port).await.and_then(|body| {
            serde_json::from_str(&body).map_err(|e| MbError::Parse(e.to_string()))
        })
    }

    /// Get the details for a specific imposter as Mountebank sent them
    pub async fn get_imposter_raw(&self, port: u16) -> Result<String> {
        let resp = self
            .send(Method::GET, &format!("/imposters/{port}"), None)
            .await?;
        Ok(Self::read(resp).await?.body)
    }

    /// List all imposters
    pub async fn list_imposters(&self) -> Result<Vec<ImposterDetail>> {
        let resp = self.send(Method::GET, "/imposters", None).await?;
        let body: ImpostersResponse = Self::read(resp).await?.json()?;
        Ok(body.imposters)
    }

    /// Delete a single imposter. Mountebank answers 200 even when nothing was on the port.
    pub async fn delete_imposter(&self, port: u16) -> Result<MbResponse> {
        let resp = self
            .send(Method::DELETE, &format!("/imposters/{port}"), None)
            .await?;
        let response = Self::read(resp).await?;
        info!("Deleted imposter on port {}", port);
        Ok(response)
    }

    /// Delete every imposter, returning what was deleted
    pub async fn delete_imposters(&self) -> Result<ImpostersResponse> {
        let resp = self.send(Method::DELETE, "/imposters", None).await?;
        let deleted: ImpostersResponse = Self::read(resp).await?.json()?;
        info!("Deleted {} imposter(s)", deleted.imposters.len());
        Ok(deleted)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(resp) => {
                debug!("{} {} -> {}", method, url, resp.status());
                Ok(resp)
            }
            Err(e) if e.is_connect() => {
                debug!("{} {} -> connection refused", method, url);
                Err(MbError::Connection {
                    url: self.base_url.clone(),
                })
            }
            Err(e) => Err(MbError::Request(e)),
        }
    }

    /// Read the body, turning non-success statuses into errors
    async fn read(resp: reqwest::Response) -> Result<MbResponse> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Self::server_error(status, &body));
        }

        Ok(MbResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn server_error(status: StatusCode, body: &str) -> MbError {
        if let Ok(error_body) = serde_json::from_str::<ErrorResponse>(body) {
            if let Some(err) = error_body.errors.into_iter().next() {
                return MbError::Server {
                    status: status.as_u16(),
                    code: err.code,
                    message: err.message,
                };
            }
        }
        MbError::Server {
            status: status.as_u16(),
            code: status.as_str().to_string(),
            message: format!("Request failed with status {status}"),
        }
    }
}
