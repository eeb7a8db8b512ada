//! Private HTTP client for Denon/Marantz receiver control
//!
//! This crate wraps the two pieces of the receiver web API the bridge needs:
//! the lightweight XML status query and the query-string command endpoints.
//! It is stateless; callers decide what to do with a failed request.

mod command;
mod error;
mod status;

pub use command::{encode_code, Command, DIRECT_PATH, MAX_DEVICE_VOLUME, POWER_PATH, STATUS_PATH};
pub use error::{ClientError, Result};
pub use status::{
    normalize_volume, DeltaField, StateDelta, StatusReport, VolumeDisplay,
    ABSOLUTE_VOLUME_OFFSET, MAX_VOLUME_LEVEL,
};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Default per-request timeout, kept below the default poll interval
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Marker the firmware puts in its wrong-port error page
const FORBIDDEN_SENTINEL: &str = "403 Forbidden";

/// Address of a receiver's control API
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Full URL for a path (which may carry a query string)
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}:{}{}", self.ip, self.port, path_and_query)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Network capability the receiver engine depends on.
///
/// [`StatusClient`] is the production implementation; tests substitute a
/// scripted one.
#[async_trait]
pub trait ReceiverTransport: Send + Sync {
    /// Issue the status query and parse the answer
    async fn fetch_status(&self, endpoint: &Endpoint) -> Result<StatusReport>;

    /// Send one control command and wait for the device to acknowledge it
    async fn send_command(&self, endpoint: &Endpoint, command: &Command) -> Result<()>;
}

/// HTTP client for receiver status queries and commands
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
}

impl StatusClient {
    /// Create a client with the default request timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT).unwrap_or_else(|_| Self {
            http: reqwest::Client::new(),
        })
    }

    /// Create a client whose every request is bounded by `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Query the receiver's status document.
    ///
    /// No retries: a single failure is returned to the caller.
    pub async fn fetch_status(&self, endpoint: &Endpoint) -> Result<StatusReport> {
        let body = self.get(endpoint, STATUS_PATH).await?;
        StatusReport::from_xml(&body)
    }

    /// Send a control command
    pub async fn send_command(&self, endpoint: &Endpoint, command: &Command) -> Result<()> {
        tracing::debug!("Sending {} to {}", command.code(), endpoint);
        self.get(endpoint, &command.path_and_query()).await?;
        Ok(())
    }

    async fn get(&self, endpoint: &Endpoint, path_and_query: &str) -> Result<String> {
        let response = self.http.get(endpoint.url(path_and_query)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ClientError::Forbidden(endpoint.to_string()));
        }
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.contains(FORBIDDEN_SENTINEL) {
            return Err(ClientError::Forbidden(endpoint.to_string()));
        }

        Ok(body)
    }
}

impl Default for StatusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReceiverTransport for StatusClient {
    async fn fetch_status(&self, endpoint: &Endpoint) -> Result<StatusReport> {
        StatusClient::fetch_status(self, endpoint).await
    }

    async fn send_command(&self, endpoint: &Endpoint, command: &Command) -> Result<()> {
        StatusClient::send_command(self, endpoint, command).await
    }
}
