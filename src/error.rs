use std::time::Duration;
use thiserror::Error;

/// Failures at the device boundary.
///
/// Connectivity loss is absorbed by the transport's reconnect loop and only
/// becomes visible to callers as a `ConnectionState` observation; the
/// variants here surface on the explicit request paths (`connect`, `send`).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("URL encoding failed: {0}")]
    UrlEncodingFailed(#[from] serde_urlencoded::ser::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Endpoint configuration rejected: {0}")]
    Configuration(String),

    #[error("Transient connectivity failure: {0}")]
    Transient(String),

    #[error("Command {seq} not acknowledged within {timeout:?}")]
    CommandTimeout { seq: u64, timeout: Duration },

    #[error("Device rejected command {seq}: {reason}")]
    Rejected { seq: u64, reason: String },

    #[error("Not connected to the device")]
    NotConnected,

    #[error("Connection explicitly closed")]
    ConnectionClosed,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Task panicked or was cancelled")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// True when the dispatcher may retry the same request once: the device
    /// never acknowledged it, so resending the same sequence number is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::CommandTimeout { .. } | TransportError::NotConnected
        )
    }
}

/// Result surfaced to `issue()` callers. Command failures are always
/// reported here, never silently dropped.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Device unreachable, retry exhausted")]
    Unreachable,

    #[error("Device rejected the command: {0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}
