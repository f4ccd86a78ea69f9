//! Local Mountebank process management.
//!
//! [`MbServer`] starts `mb` on a port and waits until it accepts admin
//! requests. The child is killed when the handle is dropped.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::MountebankClient;
use crate::config::{MountebankConfig, DEFAULT_PORT};
use crate::error::{MbError, Result};

/// Line Mountebank prints once the admin API is listening
const READY_BANNER: &str = "now taking orders";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Per-request timeout while waiting for startup
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// How to launch Mountebank
#[derive(Debug, Clone)]
pub struct MbServerOptions {
    pub port: u16,
    /// Executable to run, `mb` unless `MB_COMMAND` says otherwise
    pub command: String,
    /// Extra arguments appended after `start --port <port>`
    pub args: Vec<String>,
    pub startup_timeout: Duration,
}

impl Default for MbServerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            command: std::env::var("MB_COMMAND").unwrap_or_else(|_| "mb".to_string()),
            args: Vec::new(),
            startup_timeout: Duration::from_secs(10),
        }
    }
}

impl MbServerOptions {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

/// Handle to a Mountebank instance listening on `port`
#[derive(Debug)]
pub struct MbServer {
    port: u16,
    child: Option<Child>,
    client: MountebankClient,
}

impl MbServer {
    /// Start Mountebank and wait until it is ready.
    ///
    /// If something already answers on the port it is reused and no process is spawned.
    pub async fn start(options: MbServerOptions) -> Result<Self> {
        let config = MountebankConfig::new("localhost", options.port);
        let client = MountebankClient::new(&config)?;
        let probe = client.with_timeout(PROBE_TIMEOUT.min(options.startup_timeout))?;

        if answering(&probe).await {
            info!(
                "Mountebank already running on port {}, reusing it",
                options.port
            );
            return Ok(Self {
                port: options.port,
                child: None,
                client,
            });
        }

        let args = options.command_args();
        debug!("Spawning {} {}", options.command, args.join(" "));
        let mut child = Command::new(&options.command)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MbError::Process(format!("failed to spawn {}: {e}", options.command)))?;

        let (banner_tx, mut banner_rx) = mpsc::channel(1);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, Some(banner_tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, None));
        }

        let deadline = Instant::now() + options.startup_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(MbError::Process(format!(
                    "{} exited before becoming ready ({status})",
                    options.command
                )));
            }

            let banner_seen = banner_rx.try_recv().is_ok();
            if banner_seen || answering(&probe).await {
                info!("Mountebank ready on port {}", options.port);
                return Ok(Self {
                    port: options.port,
                    child: Some(child),
                    client,
                });
            }

            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(MbError::Timeout(options.startup_timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self) -> &MountebankClient {
        &self.client
    }

    /// Whether this handle spawned the process it points at
    pub fn is_owned(&self) -> bool {
        self.child.is_some()
    }

    /// Kill the spawned process. Does nothing for a reused instance or a second call.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            info!("Stopping Mountebank on port {}", self.port);
            if let Err(e) = child.kill().await {
                warn!("Failed to stop Mountebank on port {}: {}", self.port, e);
                return Err(MbError::Io(e));
            }
        }
        Ok(())
    }
}

/// Start `mb` on `port` with default options
pub async fn start_mb_server(port: u16) -> Result<MbServer> {
    MbServer::start(MbServerOptions::new(port)).await
}

/// Whether the admin API answers; any failure counts as "not yet"
async fn answering(probe: &MountebankClient) -> bool {
    match probe.is_running().await {
        Ok(running) => running,
        Err(e) => {
            debug!("Mountebank not answering yet: {}", e);
            false
        }
    }
}

/// Forward child output to the log, signalling once the ready banner shows up
async fn forward_output<R>(stream: R, banner_tx: Option<mpsc::Sender<()>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        debug!(target: "mountebank", "{}", line);
        if line.contains(READY_BANNER) {
            if let Some(tx) = &banner_tx {
                let _ = tx.try_send(());
            }
        }
    }
}
