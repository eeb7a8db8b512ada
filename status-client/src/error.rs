//! Error types for the status client

use thiserror::Error;

/// Errors that can occur while talking to a receiver's web API
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, read, or timeout failure
    #[error("Network/HTTP error: {0}")]
    Transport(String),

    /// The device answered with its `403 Forbidden` page.
    ///
    /// Receivers only serve the control API on one of their two web ports,
    /// so this almost always means the configured port is the wrong one.
    #[error("Device refused request on {0} (403 Forbidden); check the configured port")]
    Forbidden(String),

    /// Any other non-success HTTP status
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The status document could not be parsed
    #[error("XML parsing error: {0}")]
    Parse(String),
}

impl ClientError {
    /// True when the device reported the wrong-port sentinel
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ClientError::Forbidden(_))
    }
}

/// Result alias for status client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Transport(format!("request timed out: {}", error))
        } else {
            ClientError::Transport(error.to_string())
        }
    }
}
