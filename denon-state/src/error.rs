//! Error types for denon-state

use std::time::Duration;

use status_client::ClientError;
use thiserror::Error;

use crate::model::{ProxyHandle, ProxyKind};

/// Startup configuration problems.
///
/// All of these abort setup of the affected receiver only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Receiver {ip}: conflicting ports {first} and {second} configured for the same device")]
    PortConflict { ip: String, first: u16, second: u16 },

    #[error("Receiver {ip}: port {port} is not supported; use 80, 8080 or \"auto\"")]
    UnsupportedPort { ip: String, port: u16 },

    #[error("Invalid port value: {0}")]
    InvalidPort(String),

    #[error("Invalid receiver entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("Request timeout {timeout:?} must be shorter than the poll interval {interval:?}")]
    TimeoutExceedsInterval { timeout: Duration, interval: Duration },

    #[error("Failed to read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to the accessory framework for a user action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("No accessory attached with handle {0}")]
    UnknownProxy(ProxyHandle),

    #[error("{kind} accessories do not support {action}")]
    Unsupported { kind: ProxyKind, action: &'static str },

    #[error("Input index {index} is out of range ({len} inputs configured)")]
    InputOutOfRange { index: u32, len: usize },

    #[error("Command failed: {0}")]
    Command(#[from] ClientError),

    #[error("Receiver is no longer running")]
    ReceiverGone,
}

/// Result type for configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for user actions
pub type ActionResult<T> = std::result::Result<T, ActionError>;
