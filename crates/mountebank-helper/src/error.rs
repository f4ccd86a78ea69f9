//! Error type shared by every Mountebank operation.

use thiserror::Error;

/// Errors that can occur while building imposters or talking to Mountebank
#[derive(Error, Debug)]
pub enum MbError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Cannot connect to Mountebank at {url} (is it running?)")]
    Connection { url: String },
    #[error("Mountebank returned error: {message} (status: {status}, code: {code})")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Invalid route: {0}")]
    Validation(String),
    #[error("No route registered for {verb} {uri}")]
    RouteNotFound { verb: String, uri: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Mountebank process error: {0}")]
    Process(String),
    #[error("Timed out after {0:?} waiting for Mountebank")]
    Timeout(std::time::Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MbError {
    /// Whether the error means Mountebank could not be reached at all
    pub fn is_connection(&self) -> bool {
        match self {
            MbError::Connection { .. } => true,
            MbError::Request(e) => e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MbError>;
