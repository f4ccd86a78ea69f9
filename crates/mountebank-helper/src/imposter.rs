//! Imposter builder.
//!
//! An [`Imposter`] collects routes for a single port, turns them into a
//! Mountebank imposter definition and keeps it in sync with a running
//! Mountebank instance. Updating a response rewrites the local route and
//! reposts the whole imposter, which is how Mountebank expects stubs created
//! through `POST /imposters` to be replaced.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::client::{MbResponse, MountebankClient};
use crate::config::MountebankConfig;
use crate::error::{MbError, Result};
use crate::route::{Route, RouteKey};
use crate::types::{
    ImposterDefinition, ImposterDetail, IsResponse, Predicate, Protocol, RequestFields, Stub,
    StubResponse,
};

/// Settings for a new [`Imposter`]
#[derive(Debug, Clone)]
pub struct ImposterOptions {
    pub imposter_port: u16,
    pub protocol: Protocol,
    pub name: Option<String>,
    pub mountebank: MountebankConfig,
}

impl ImposterOptions {
    /// Options for `port` using the default Mountebank location
    pub fn new(imposter_port: u16) -> Self {
        Self {
            imposter_port,
            protocol: Protocol::Http,
            name: None,
            mountebank: MountebankConfig::default(),
        }
    }

    pub fn with_mountebank(mut self, mountebank: MountebankConfig) -> Self {
        self.mountebank = mountebank;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }
}

/// A single attribute of a route's response to replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseUpdate {
    Body(String),
    StatusCode(u16),
    Headers(HashMap<String, String>),
}

impl ResponseUpdate {
    fn kind(&self) -> &'static str {
        match self {
            ResponseUpdate::Body(_) => "body",
            ResponseUpdate::StatusCode(_) => "status code",
            ResponseUpdate::Headers(_) => "headers",
        }
    }
}

/// Routes for one imposter port plus the client used to publish them
#[derive(Debug, Clone)]
pub struct Imposter {
    port: u16,
    protocol: Protocol,
    name: Option<String>,
    routes: Vec<Route>,
    client: MountebankClient,
}

impl Imposter {
    pub fn new(options: ImposterOptions) -> Result<Self> {
        if options.imposter_port == 0 {
            return Err(MbError::Validation(
                "imposter port must be a non-zero port number".to_string(),
            ));
        }

        let client = MountebankClient::new(&options.mountebank)?;
        Ok(Self {
            port: options.imposter_port,
            protocol: options.protocol,
            name: options.name,
            routes: Vec::new(),
            client,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self) -> &MountebankClient {
        &self.client
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, key: &RouteKey) -> Option<&Route> {
        self.routes.iter().find(|r| key.matches(r))
    }

    /// Add a route. A route with the same uri and verb is replaced in place.
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self> {
        let route = route.validate()?;
        let key = route.key();

        match self.routes.iter_mut().find(|r| key.matches(r)) {
            Some(existing) => {
                debug!("Replacing route {} on imposter {}", key, self.port);
                *existing = route;
            }
            None => {
                debug!("Adding route {} to imposter {}", key, self.port);
                self.routes.push(route);
            }
        }

        Ok(self)
    }

    /// Build the `POST /imposters` body: one `matches` stub per route, in insertion order
    pub fn to_definition(&self) -> ImposterDefinition {
        ImposterDefinition {
            port: self.port,
            protocol: self.protocol,
            name: self.name.clone(),
            record_requests: false,
            stubs: self.routes.iter().map(stub_for_route).collect(),
        }
    }

    /// Replace whatever is on the port with this imposter
    pub async fn post_to_mountebank(&self) -> Result<MbResponse> {
        self.delete_old_imposter().await?;
        let response = self.client.create_imposter(&self.to_definition()).await?;
        if !response.is_created() {
            warn!(
                "Mountebank answered {} instead of 201 for imposter {}",
                response.status, self.port
            );
        }
        Ok(response)
    }

    /// Delete the imposter currently registered on this port, if any
    pub async fn delete_old_imposter(&self) -> Result<MbResponse> {
        self.client.delete_imposter(self.port).await
    }

    /// Fetch this imposter from Mountebank
    pub async fn get_imposter(&self) -> Result<ImposterDetail> {
        self.client.get_imposter(self.port).await
    }

    /// Change one attribute of a route's response and repost the imposter.
    ///
    /// Returns the imposter as created by Mountebank. The local change is kept
    /// even if reposting fails, so `post_to_mountebank` can be retried.
    pub async fn update_response(
        &mut self,
        update: ResponseUpdate,
        key: &RouteKey,
    ) -> Result<ImposterDetail> {
        let port = self.port;
        let route = self
            .routes
            .iter_mut()
            .find(|r| key.matches(r))
            .ok_or_else(|| MbError::RouteNotFound {
                verb: key.verb.clone(),
                uri: key.uri.clone(),
            })?;

        info!("Updating {} of {} on imposter {}", update.kind(), key, port);
        match update {
            ResponseUpdate::Body(body) => route.res.response_body = body,
            ResponseUpdate::StatusCode(code) => route.res.status_code = code,
            ResponseUpdate::Headers(headers) => route.res.response_headers = headers,
        }

        self.post_to_mountebank().await?.json()
    }

    pub async fn update_response_body(
        &mut self,
        body: impl Into<String>,
        key: &RouteKey,
    ) -> Result<ImposterDetail> {
        self.update_response(ResponseUpdate::Body(body.into()), key)
            .await
    }

    pub async fn update_response_code(
        &mut self,
        status_code: u16,
        key: &RouteKey,
    ) -> Result<ImposterDetail> {
        if !(100..=599).contains(&status_code) {
            return Err(MbError::Validation(format!(
                "status code {status_code} is outside 100-599"
            )));
        }
        self.update_response(ResponseUpdate::StatusCode(status_code), key)
            .await
    }

    pub async fn update_response_headers(
        &mut self,
        headers: HashMap<String, String>,
        key: &RouteKey,
    ) -> Result<ImposterDetail> {
        self.update_response(ResponseUpdate::Headers(headers), key)
            .await
    }
}

fn stub_for_route(route: &Route) -> Stub {
    Stub {
        predicates: vec![Predicate::matches(RequestFields::method_and_path(
            route.verb.clone(),
            route.uri.clone(),
        ))],
        responses: vec![StubResponse::is(IsResponse {
            status_code: route.res.status_code,
            headers: route.res.response_headers.clone(),
            body: Some(serde_json::Value::String(route.res.response_body.clone())),
            mode: None,
        })],
    }
}
