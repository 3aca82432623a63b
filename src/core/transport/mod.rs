//! Line-oriented transport layer
//!
//! The control engine only ever sees whole text lines. Each transport owns
//! its own byte framing and hands complete lines to the read loop.
//!
//! Supports:
//! - Serial ports (RS-232, 9600 8N1 by default)
//! - TCP connections with an optional password line
//! - Simulated devices (see [`crate::core::simulator`])

mod lines;
mod serial;
mod tcp;

pub use lines::LineBuffer;
pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity, SerialTransport};
pub use tcp::{TcpConfig, TcpTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Serial port connection
    Serial(SerialConfig),
    /// TCP connection
    Tcp(TcpConfig),
}

impl Default for Transport {
    fn default() -> Self {
        Self::Serial(SerialConfig::default())
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// TCP socket
    Tcp,
    /// In-process simulated device
    Simulated,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Tcp => write!(f, "TCP"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No line arrived before the read timeout elapsed
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Remote end went away
    #[error("Disconnected")]
    Disconnected,

    /// Send error
    #[error("Send error: {0}")]
    SendError(String),

    /// Receive error
    #[error("Receive error: {0}")]
    ReceiveError(String),
}

impl TransportError {
    /// Read timeouts are expected while the device is idle
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Line transport consumed by the connection engine
///
/// Methods take `&self` so the read loop can block in [`read_line`](Self::read_line)
/// while other tasks keep writing. Implementations keep separate locks for
/// their read and write halves. Resources are released on drop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Whether the underlying link is currently open
    fn is_open(&self) -> bool;

    /// Open the link
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the link
    async fn close(&self) -> Result<(), TransportError>;

    /// Write a command string to the device
    async fn write(&self, text: &str) -> Result<(), TransportError>;

    /// Wait for the next complete line
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives within the
    /// configured read timeout.
    async fn read_line(&self) -> Result<String, TransportError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;
}

/// Create a transport instance from configuration
pub fn create_transport(config: Transport) -> Arc<dyn LineTransport> {
    match config {
        Transport::Serial(cfg) => Arc::new(SerialTransport::new(cfg)),
        Transport::Tcp(cfg) => Arc::new(TcpTransport::new(cfg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_benign() {
        assert!(TransportError::Timeout(Duration::from_millis(100)).is_timeout());
        assert!(!TransportError::Disconnected.is_timeout());
        assert!(!TransportError::NotConnected.is_timeout());
    }

    #[test]
    fn test_create_transport_reports_type() {
        let serial = create_transport(Transport::Serial(SerialConfig::new("/dev/ttyS0")));
        assert_eq!(serial.transport_type(), TransportType::Serial);
        assert!(!serial.is_open());

        let tcp = create_transport(Transport::Tcp(TcpConfig::new("10.0.0.5", 23)));
        assert_eq!(tcp.transport_type(), TransportType::Tcp);
        assert_eq!(tcp.connection_info(), "tcp://10.0.0.5:23");
    }
}
