//! In-process stand-in for the Mountebank admin API.
//!
//! Implements the endpoints the helper uses and serves every created imposter
//! on its own port, matching `equals`/`matches` predicates on method and path.
//! Unmatched requests get an empty 200, as Mountebank does.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use mountebank_helper::MountebankConfig;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A port nobody is listening on
pub fn free_port() -> u16 {
    port_check::free_local_port().expect("no free local port")
}

/// Client-side config pointing at a port with no Mountebank behind it
pub fn unreachable_config() -> MountebankConfig {
    let mut config = MountebankConfig::new("127.0.0.1", free_port());
    config.timeout_secs = 2;
    config
}

/// Fetch `path` from an imposter port, returning status and body
pub async fn hit(port: u16, method: &str, path: &str) -> (u16, String) {
    let client = reqwest::Client::new();
    let method = reqwest::Method::from_bytes(method.as_bytes()).expect("valid method");
    let resp = client
        .request(method, format!("http://127.0.0.1:{port}{path}"))
        .send()
        .await
        .expect("imposter request failed");
    let status = resp.status().as_u16();
    (status, resp.text().await.expect("imposter body"))
}

struct RunningImposter {
    port: u16,
    definition: Value,
    requests: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningImposter {
    fn detail(&self, base_url: &str) -> Value {
        let mut detail = self.definition.clone();
        detail["numberOfRequests"] = json!(self.requests.load(Ordering::Relaxed));
        detail["requests"] = json!([]);
        detail["_links"] = json!({
            "self": { "href": format!("{base_url}/imposters/{}", self.port) },
            "stubs": { "href": format!("{base_url}/imposters/{}/stubs", self.port) }
        });
        detail
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

#[derive(Default)]
struct FakeState {
    /// Creation order is kept so list/delete-all answer like Mountebank
    imposters: RwLock<Vec<RunningImposter>>,
}

impl FakeState {
    fn take(&self, port: u16) -> Option<RunningImposter> {
        let mut imposters = self.imposters.write();
        let index = imposters.iter().position(|i| i.port == port)?;
        Some(imposters.remove(index))
    }
}

/// Fake Mountebank admin API bound to an ephemeral port
pub struct FakeMountebank {
    addr: SocketAddr,
    state: Arc<FakeState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FakeMountebank {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake mountebank");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(FakeState::default());
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        let state = Arc::clone(&server_state);
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, hyper::Error>(route_admin(req, state, addr).await) }
                            });
                            let _ = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await;
                        });
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn config(&self) -> MountebankConfig {
        MountebankConfig::new("127.0.0.1", self.port())
    }

    pub fn imposter_ports(&self) -> Vec<u16> {
        self.state.imposters.read().iter().map(|i| i.port).collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let imposters: Vec<RunningImposter> = self.state.imposters.write().drain(..).collect();
        for imposter in imposters {
            imposter.stop().await;
        }
    }
}

// =============================================================================
// Admin API
// =============================================================================

async fn route_admin(
    req: Request<Incoming>,
    state: Arc<FakeState>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let base_url = format!("http://{addr}");
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/") => {
            return json_response(
                StatusCode::OK,
                &json!({ "_links": { "imposters": { "href": format!("{base_url}/imposters") } } }),
            )
        }
        (&Method::POST, "/imposters") => return handle_create(req, state, &base_url).await,
        (&Method::GET, "/imposters") => {
            let summaries: Vec<Value> = state
                .imposters
                .read()
                .iter()
                .map(|i| {
                    json!({
                        "protocol": i.definition["protocol"],
                        "port": i.port,
                        "numberOfRequests": i.requests.load(Ordering::Relaxed),
                    })
                })
                .collect();
            return json_response(StatusCode::OK, &json!({ "imposters": summaries }));
        }
        (&Method::DELETE, "/imposters") => {
            let removed: Vec<RunningImposter> = state.imposters.write().drain(..).collect();
            let details: Vec<Value> = removed.iter().map(|i| i.detail(&base_url)).collect();
            for imposter in removed {
                imposter.stop().await;
            }
            return json_response(StatusCode::OK, &json!({ "imposters": details }));
        }
        _ => {}
    }

    let Some(port) = path
        .strip_prefix("/imposters/")
        .and_then(|p| p.parse::<u16>().ok())
    else {
        return error_response(StatusCode::NOT_FOUND, "no such resource", "Not Found");
    };

    match method {
        Method::GET => {
            let detail = state
                .imposters
                .read()
                .iter()
                .find(|i| i.port == port)
                .map(|i| i.detail(&base_url));
            match detail {
                Some(detail) => json_response(StatusCode::OK, &detail),
                None => error_response(
                    StatusCode::NOT_FOUND,
                    "no such resource",
                    &format!("Try POSTing to /imposters first? ({port})"),
                ),
            }
        }
        Method::DELETE => match state.take(port) {
            Some(imposter) => {
                let detail = imposter.detail(&base_url);
                imposter.stop().await;
                json_response(StatusCode::OK, &detail)
            }
            None => json_response(StatusCode::OK, &json!({})),
        },
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "bad data", "Unsupported"),
    }
}

async fn handle_create(
    req: Request<Incoming>,
    state: Arc<FakeState>,
    base_url: &str,
) -> Response<Full<Bytes>> {
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "bad data", &e.to_string()),
    };
    let definition: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid JSON", &e.to_string()),
    };
    let Some(port) = definition["port"].as_u64().and_then(|p| u16::try_from(p).ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "bad data", "port is required");
    };

    if state.imposters.read().iter().any(|i| i.port == port) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "resource conflict",
            &format!("Port {port} is already in use"),
        );
    }

    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(l) => l,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "resource conflict",
                &format!("Failed to bind port {port}: {e}"),
            )
        }
    };

    let stubs = Arc::new(compile_stubs(&definition));
    let requests = Arc::new(AtomicU64::new(0));
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let serve_requests = Arc::clone(&requests);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    let Ok((stream, _)) = result else { continue };
                    let stubs = Arc::clone(&stubs);
                    let requests = Arc::clone(&serve_requests);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let stubs = Arc::clone(&stubs);
                            requests.fetch_add(1, Ordering::Relaxed);
                            async move { Ok::<_, hyper::Error>(serve_imposter(req, &stubs)) }
                        });
                        // Old connections must not outlive a reposted imposter
                        let _ = http1::Builder::new()
                            .keep_alive(false)
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    let imposter = RunningImposter {
        port,
        definition,
        requests,
        shutdown_tx,
        handle,
    };
    let detail = imposter.detail(base_url);
    state.imposters.write().push(imposter);

    json_response(StatusCode::CREATED, &detail)
}

// =============================================================================
// Imposter matching
// =============================================================================

enum FieldMatch {
    Equals(String),
    Matches(Regex),
}

impl FieldMatch {
    fn test(&self, actual: &str) -> bool {
        match self {
            FieldMatch::Equals(expected) => expected.eq_ignore_ascii_case(actual),
            FieldMatch::Matches(re) => re.is_match(actual),
        }
    }
}

struct CompiledStub {
    conditions: Vec<(&'static str, FieldMatch)>,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

fn compile_stubs(definition: &Value) -> Vec<CompiledStub> {
    let Some(stubs) = definition["stubs"].as_array() else {
        return Vec::new();
    };

    stubs
        .iter()
        .map(|stub| {
            let mut conditions = Vec::new();
            for predicate in stub["predicates"].as_array().into_iter().flatten() {
                for field in ["method", "path"] {
                    if let Some(value) = predicate["equals"][field].as_str() {
                        conditions.push((field, FieldMatch::Equals(value.to_string())));
                    }
                    if let Some(pattern) = predicate["matches"][field].as_str() {
                        let re = Regex::new(pattern).expect("predicate pattern");
                        conditions.push((field, FieldMatch::Matches(re)));
                    }
                }
            }

            let is = &stub["responses"][0]["is"];
            let status = match &is["statusCode"] {
                Value::Number(n) => n.as_u64().unwrap_or(200) as u16,
                Value::String(s) => s.parse().unwrap_or(200),
                _ => 200,
            };
            let headers = is["headers"]
                .as_object()
                .map(|h| {
                    h.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let body = match &is["body"] {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            CompiledStub {
                conditions,
                status,
                headers,
                body,
            }
        })
        .collect()
}

fn serve_imposter(req: Request<Incoming>, stubs: &[CompiledStub]) -> Response<Full<Bytes>> {
    let method = req.method().as_str();
    let path = req.uri().path();

    let matched = stubs.iter().find(|stub| {
        stub.conditions.iter().all(|(field, condition)| match *field {
            "method" => condition.test(method),
            _ => condition.test(path),
        })
    });

    let Some(stub) = matched else {
        return Response::new(Full::new(Bytes::new()));
    };

    let mut builder = Response::builder().status(stub.status);
    for (name, value) in &stub.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(Bytes::from(stub.body.clone())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

// =============================================================================
// Response helpers
// =============================================================================

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &json!({ "errors": [{ "code": code, "message": message }] }),
    )
}
